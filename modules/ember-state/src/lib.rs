//! Run state and its persistence.
//!
//! [`TrainState`] is the payload an ember engine threads through a run. The
//! engine only reads and writes its counters; everything else is carried
//! as-is. [`StateStore`] is the save/load boundary, with a JSON file
//! implementation for real runs and an in-memory one for tests.

pub mod checkpoint;
pub mod error;
pub mod state;
pub mod store;

pub use checkpoint::{checkpoint_handler, checkpoint_path, latest_checkpoint};
pub use error::StateStoreError;
pub use state::TrainState;
pub use store::{JsonFileStore, MemoryStateStore, Snapshot, StateStore};
