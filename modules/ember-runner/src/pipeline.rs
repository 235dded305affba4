//! The handlers a runner registers on top of the engine defaults.

use std::path::Path;

use anyhow::{anyhow, Result};
use ember_engine::handlers::{epoch_length, max_epochs};
use ember_engine::{Args, Engine, Event, EventTarget, HandlerResult, Value, BATCH, STATE};
use ember_state::{checkpoint_handler, latest_checkpoint, JsonFileStore, TrainState};
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;

/// Values per synthetic batch.
pub const BATCH_SIZE: u64 = 4;

/// The state a fresh run starts from, and the template snapshots are checked
/// against on resume.
pub fn initial_state() -> TrainState {
    TrainState::new().with_field("samples_seen", 0)
}

/// Load the state to resume from. A directory resolves to its latest checkpoint.
pub fn resume_state(path: &Path) -> Result<TrainState> {
    let file = if path.is_dir() {
        latest_checkpoint(path)?
            .ok_or_else(|| anyhow!("no checkpoints in {}", path.display()))?
    } else {
        path.to_path_buf()
    };
    let state = TrainState::load_from_disk(&file, &initial_state())?;
    info!(
        path = %file.display(),
        step = state.counters.step,
        epoch = state.counters.epoch,
        "Resuming"
    );
    Ok(state)
}

/// Deterministic stand-in for a data loader.
fn synthetic_batch(args: Args<'_, TrainState>) -> HandlerResult<TrainState> {
    let step = args.state(0)?.counters.step;
    let values: Vec<u64> = (0..BATCH_SIZE).map(|i| (step * BATCH_SIZE + i) % 7).collect();
    Ok(Value::json(json!({ "step": step, "values": values })))
}

fn consume_batch(mut args: Args<'_, TrainState>) -> HandlerResult<TrainState> {
    let batch = args.take_json(1)?;
    let mut state = args.state_mut(0)?;
    let batch = batch.ok_or_else(|| anyhow!("no batch at step {}", state.counters.step))?;
    let size = batch["values"].as_array().map_or(0, Vec::len) as u64;

    let seen = state.field("samples_seen").and_then(|v| v.as_u64()).unwrap_or(0);
    state.set_field("samples_seen", seen + size);
    debug!(step = state.counters.step, size, "Batch processed");
    Ok(Value::Unit)
}

fn log_epoch(args: Args<'_, TrainState>) -> HandlerResult<TrainState> {
    let state = args.state(0)?;
    info!(
        epoch = state.counters.epoch,
        step = state.counters.step,
        samples_seen = ?state.field("samples_seen"),
        "Epoch finished"
    );
    Ok(Value::Unit)
}

/// Where checkpoints are taken: every `n` steps on `Checkpoint`, plus on
/// `EpochCompleted` when the epoch ends on such a step. The epoch's last
/// iteration never reaches `Checkpoint`.
fn checkpoint_target(n: u64) -> EventTarget<TrainState> {
    Event::Checkpoint.every::<TrainState>(n)
        | Event::EpochCompleted.filter::<TrainState, _>(move |engine, _epoch| {
            engine
                .counter(Event::Checkpoint)
                .is_ok_and(|step| step.checked_rem(n) == Some(0))
        })
}

/// An engine wired for `config`: batches, processing, epoch and run bounds,
/// and checkpoints when enabled.
pub fn build_engine(config: &Config) -> Engine<TrainState> {
    let engine = Engine::new();

    engine.register(Event::GetBatch, synthetic_batch, STATE, BATCH);
    engine.register(Event::Process, consume_batch, [STATE, BATCH], ());
    engine.register(
        Event::IterationCompleted,
        epoch_length::<TrainState>(config.epoch_length),
        STATE,
        (),
    );

    // Must precede `max_epochs`: End-Run stops the later EpochCompleted handlers.
    if config.checkpoint_every > 0 {
        engine.register(
            checkpoint_target(config.checkpoint_every),
            checkpoint_handler(JsonFileStore, config.checkpoint_dir.clone()),
            STATE,
            (),
        );
    }

    engine.register(Event::EpochCompleted, log_epoch, STATE, ());
    engine.register(
        Event::EpochCompleted,
        max_epochs::<TrainState>(config.max_epochs),
        STATE,
        (),
    );

    engine
}
