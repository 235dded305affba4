//! The state payload threaded through a training run.

use std::collections::BTreeSet;
use std::path::Path;

use ember_engine::{Counters, EngineState};
use serde::{Deserialize, Serialize};

use crate::error::StateStoreError;
use crate::store::{JsonFileStore, StateStore};

/// Counters plus whatever the caller's handlers keep between ticks.
///
/// The engine only touches `counters`. `payload` is free-form and is carried
/// through save/load untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainState {
    #[serde(flatten)]
    pub counters: Counters,
    pub loss: Option<f64>,
    pub best_val_metric: Option<f64>,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl TrainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.payload.get(name)
    }

    pub fn set_field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.payload.insert(name.into(), value.into())
    }

    /// Names of the payload fields. Two states with the same shape can be
    /// loaded into one another.
    pub fn shape(&self) -> BTreeSet<&str> {
        self.payload.keys().map(String::as_str).collect()
    }

    /// Write a snapshot with the default file store.
    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<(), StateStoreError> {
        JsonFileStore.save(self, path.as_ref())
    }

    /// Read a snapshot with the default file store, checked against `like`.
    pub fn load_from_disk(
        path: impl AsRef<Path>,
        like: &TrainState,
    ) -> Result<TrainState, StateStoreError> {
        JsonFileStore.load(path.as_ref(), like)
    }
}

impl EngineState for TrainState {
    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }
}
