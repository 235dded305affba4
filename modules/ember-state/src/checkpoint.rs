//! Checkpoint handler and file naming.

use std::fs;
use std::path::{Path, PathBuf};

use ember_engine::{Args, HandlerResult, Value};
use tracing::info;

use crate::error::StateStoreError;
use crate::state::TrainState;
use crate::store::StateStore;

/// `dir/step-<step>.json`
pub fn checkpoint_path(dir: &Path, step: u64) -> PathBuf {
    dir.join(format!("step-{step}.json"))
}

fn step_of(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix("step-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// The checkpoint in `dir` with the highest step, if any.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>, StateStoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StateStoreError::io(dir, e))?;

    let mut latest: Option<(u64, PathBuf)> = None;
    for entry in entries {
        let path = entry.map_err(|e| StateStoreError::io(dir, e))?.path();
        if let Some(step) = step_of(&path) {
            if latest.as_ref().map_or(true, |(best, _)| step > *best) {
                latest = Some((step, path));
            }
        }
    }
    Ok(latest.map(|(_, path)| path))
}

/// Handler that saves `state` into `dir` through `store`.
///
/// Bind `state` as the only input and nothing as output. Usually registered
/// on a filtered `Checkpoint` event, e.g. `Event::Checkpoint.every(100)`.
/// The handler owns `dir`, so it can be registered on any engine.
pub fn checkpoint_handler<P>(
    store: P,
    dir: PathBuf,
) -> impl Fn(Args<'_, TrainState>) -> HandlerResult<TrainState>
where
    P: StateStore + 'static,
{
    move |args: Args<'_, TrainState>| -> HandlerResult<TrainState> {
        let state = args.state(0)?;
        let path = checkpoint_path(&dir, state.counters.step);
        store.save(&state, &path).map_err(anyhow::Error::from)?;
        info!(step = state.counters.step, path = %path.display(), "Checkpoint saved");
        Ok(Value::Unit)
    }
}
