//! Persistence round trips and checkpointing from inside a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ember_engine::handlers::{epoch_length, max_epochs};
use ember_engine::{Engine, Event, STATE};
use ember_state::{
    checkpoint_handler, checkpoint_path, latest_checkpoint, JsonFileStore, MemoryStateStore,
    StateStore, StateStoreError, TrainState,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn template() -> TrainState {
    TrainState::new()
        .with_field("weights", json!([]))
        .with_field("rng", 0)
}

fn bounded(engine: &Engine<TrainState>, iterations: u64, epochs: u64) {
    engine.register(
        Event::IterationCompleted,
        epoch_length::<TrainState>(iterations),
        STATE,
        (),
    );
    engine.register(Event::EpochCompleted, max_epochs::<TrainState>(epochs), STATE, ());
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn file_store_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let mut state = template()
        .with_field("weights", json!([0.1, -0.2]))
        .with_field("rng", 1234);
    state.counters.step = 30;
    state.counters.epoch = 3;
    state.best_val_metric = Some(0.875);

    state.save_to_disk(&path).unwrap();
    let loaded = TrainState::load_from_disk(&path, &template()).unwrap();

    assert_eq!(loaded, state);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn file_store_rejects_snapshot_of_other_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    TrainState::new()
        .with_field("weights", json!([1]))
        .save_to_disk(&path)
        .unwrap();

    let err = JsonFileStore.load(&path, &template()).unwrap_err();

    match err {
        StateStoreError::ShapeMismatch { missing, unexpected } => {
            assert_eq!(missing, vec!["rng".to_string()]);
            assert!(unexpected.is_empty());
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
}

#[test]
fn file_store_reports_missing_and_corrupt_files() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        JsonFileStore.load(&missing, &template()),
        Err(StateStoreError::NotFound(path)) if path == missing
    ));

    let corrupt = dir.path().join("corrupt.json");
    fs::write(&corrupt, b"{ not json").unwrap();
    assert!(matches!(
        JsonFileStore.load(&corrupt, &template()),
        Err(StateStoreError::Encoding(_))
    ));
}

#[test]
fn failed_rename_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    fs::create_dir_all(path.join("occupied")).unwrap();

    let err = template().save_to_disk(&path).unwrap_err();

    assert!(matches!(err, StateStoreError::Io { .. }), "{err:?}");
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn checkpoint_handler_saves_on_filtered_steps() {
    let store = Arc::new(MemoryStateStore::new());
    let mut engine = Engine::<TrainState>::new();
    engine.register(
        Event::Checkpoint.every::<TrainState>(2),
        checkpoint_handler(Arc::clone(&store), PathBuf::from("ckpt")),
        STATE,
        (),
    );
    bounded(&engine, 5, 2);

    let state = engine.run(template()).unwrap();

    // Checkpoint fires for steps 1..=4 of each epoch (step 5 and 10 end the epoch).
    let expected: Vec<PathBuf> = [2u64, 4, 6, 8]
        .into_iter()
        .map(|step| checkpoint_path(Path::new("ckpt"), step))
        .collect();
    assert_eq!(store.paths(), expected);
    assert_eq!(state.counters.step, 10);

    let saved = store.load(&expected[1], &template()).unwrap();
    assert_eq!(saved.counters.step, 4);
    assert_eq!(saved.counters.iteration, 4);
}

#[test]
fn run_resumes_from_latest_checkpoint_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = Engine::<TrainState>::new();
    first.register(
        Event::EpochCompleted,
        checkpoint_handler(JsonFileStore, dir.path().to_path_buf()),
        STATE,
        (),
    );
    bounded(&first, 3, 1);
    first.run(template().with_field("rng", 99)).unwrap();

    let path = latest_checkpoint(dir.path()).unwrap().expect("a checkpoint");
    let restored = TrainState::load_from_disk(&path, &template()).unwrap();
    assert_eq!(restored.counters.epoch, 1);
    assert_eq!(restored.field("rng"), Some(&json!(99)));

    let mut second = Engine::<TrainState>::new();
    bounded(&second, 3, 2);
    let state = second.run(restored).unwrap();

    assert_eq!(state.counters.step, 6);
    assert_eq!(state.counters.epoch, 2);
    assert_eq!(state.field("rng"), Some(&json!(99)));
}
