//! The contract between the engine and the state it threads through a run.

use serde::{Deserialize, Serialize};

/// Names one of the three counters owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Step,
    Epoch,
    Iteration,
}

/// Progress counters. Only the default handlers write these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Iterations completed across the whole run.
    pub step: u64,
    /// Epochs completed.
    pub epoch: u64,
    /// Iterations completed in the current epoch.
    pub iteration: u64,
}

impl Counters {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Step => self.step,
            Counter::Epoch => self.epoch,
            Counter::Iteration => self.iteration,
        }
    }
}

/// State threaded through a run.
///
/// Everything except the counters is opaque to the engine. `Clone` backs
/// [`Args::take_state`](crate::Args::take_state), for handlers that return a
/// modified copy through a `state` output binding.
pub trait EngineState: Clone + 'static {
    fn counters(&self) -> &Counters;

    fn counters_mut(&mut self) -> &mut Counters;
}

impl EngineState for Counters {
    fn counters(&self) -> &Counters {
        self
    }

    fn counters_mut(&mut self) -> &mut Counters {
        self
    }
}
