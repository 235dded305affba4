//! Event-driven epoch/iteration loop.
//!
//! An [`Engine`] fires a fixed sequence of [`Event`]s around two nested loops
//! and dispatches each one to the handlers registered for it. Handlers declare
//! their inputs and outputs by name (`"engine"`, `"state"`,
//! `"batch"`, or anything a previous handler wrote), so the engine never needs
//! to know what a handler does.
//!
//! The loop has no built-in exit. Handlers end it by returning
//! [`Interrupt::EndIteration`] (finish the epoch) or [`Interrupt::EndRun`]
//! (finish the run). Any other error aborts the run as-is.
//!
//! Firing order for one run:
//!
//! ```text
//! RunStarted
//! loop:
//!     EpochStarted
//!     loop:
//!         GetBatchStarted, GetBatch, GetBatchCompleted,
//!         IterationStarted, Process, IterationCompleted, Checkpoint
//!     (on EndIteration) EpochCompleted
//! (on EndRun) RunTerminated
//! RunCompleted
//! ```

pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod registry;
pub mod traits;
pub mod value;

pub use engine::{Engine, On};
pub use error::{EngineError, Interrupt, Signal};
pub use events::{Event, EventGroup, EventTarget, FilteredEvent};
pub use registry::{HandlerEntry, HandlerFn, HandlerResult, Registry};
pub use traits::{Counter, Counters, EngineState};
pub use value::{Arg, Args, Binding, IntoNames, Value, BATCH, ENGINE, LAST_EVENT, STATE};
