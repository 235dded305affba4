//! StateStore implementations.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateStoreError;
use crate::state::TrainState;

/// Saves and restores run state. The engine never calls this itself; handlers
/// do (see [`crate::checkpoint_handler`]).
pub trait StateStore {
    fn save(&self, state: &TrainState, path: &Path) -> Result<(), StateStoreError>;

    /// Load the snapshot at `path`. `like` is a template: the snapshot must
    /// carry the same payload fields.
    fn load(&self, path: &Path, like: &TrainState) -> Result<TrainState, StateStoreError>;
}

/// What is actually written: the state plus when it was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub state: TrainState,
}

impl Snapshot {
    pub fn new(state: TrainState) -> Self {
        Self {
            saved_at: Utc::now(),
            state,
        }
    }

    /// Unwrap the state if its payload has the same fields as `like`.
    pub fn into_state_like(self, like: &TrainState) -> Result<TrainState, StateStoreError> {
        check_shape(&self.state, like)?;
        Ok(self.state)
    }
}

fn check_shape(state: &TrainState, like: &TrainState) -> Result<(), StateStoreError> {
    let expected = like.shape();
    let found = state.shape();
    if expected == found {
        return Ok(());
    }
    Err(StateStoreError::ShapeMismatch {
        missing: expected.difference(&found).map(|s| s.to_string()).collect(),
        unexpected: found.difference(&expected).map(|s| s.to_string()).collect(),
    })
}

// ---------------------------------------------------------------------------
// JsonFileStore: one pretty-printed JSON file per snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl StateStore for JsonFileStore {
    fn save(&self, state: &TrainState, path: &Path) -> Result<(), StateStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateStoreError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(&Snapshot::new(state.clone()))?;

        // Never leave a partial file under the real name.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| StateStoreError::io(&tmp, e))?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(StateStoreError::io(path, err));
        }

        debug!(path = %path.display(), step = state.counters.step, "Snapshot written");
        Ok(())
    }

    fn load(&self, path: &Path, like: &TrainState) -> Result<TrainState, StateStoreError> {
        let bytes = fs::read(path).map_err(|e| StateStoreError::io(path, e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), saved_at = %snapshot.saved_at, "Snapshot read");
        snapshot.into_state_like(like)
    }
}

// ---------------------------------------------------------------------------
// MemoryStateStore: no filesystem, for tests
// ---------------------------------------------------------------------------

/// In-memory store for testing. Snapshots are kept in encoded form so a load
/// goes through the same decoding and shape check as the file store.
pub struct MemoryStateStore {
    snapshots: Mutex<HashMap<PathBuf, serde_json::Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Every path saved so far, sorted (for test assertions).
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, serde_json::Value>> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, state: &TrainState, path: &Path) -> Result<(), StateStoreError> {
        let encoded = serde_json::to_value(Snapshot::new(state.clone()))?;
        self.lock().insert(path.to_path_buf(), encoded);
        Ok(())
    }

    fn load(&self, path: &Path, like: &TrainState) -> Result<TrainState, StateStoreError> {
        let encoded = self
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| StateStoreError::NotFound(path.to_path_buf()))?;
        let snapshot: Snapshot = serde_json::from_value(encoded)?;
        snapshot.into_state_like(like)
    }
}

// ---------------------------------------------------------------------------
// Arc<P> blanket impl
// ---------------------------------------------------------------------------

impl<P: StateStore + ?Sized> StateStore for Arc<P> {
    fn save(&self, state: &TrainState, path: &Path) -> Result<(), StateStoreError> {
        (**self).save(state, path)
    }

    fn load(&self, path: &Path, like: &TrainState) -> Result<TrainState, StateStoreError> {
        (**self).load(path, like)
    }
}
