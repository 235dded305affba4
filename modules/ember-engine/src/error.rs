//! Errors and control signals raised by handlers.

use std::fmt;

use thiserror::Error;

use crate::events::Event;

/// The two scope-exit signals a handler may raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Leave the current epoch's iteration loop.
    EndIteration,
    /// Leave the whole run.
    EndRun,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::EndIteration => f.write_str("end-iteration"),
            Signal::EndRun => f.write_str("end-run"),
        }
    }
}

/// Structural failures detected by the engine itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{count} output bindings require a tuple result, got {got}")]
    NotMultiValued { count: usize, got: &'static str },

    #[error("argument {index} is {got}, expected {expected}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("no state is attached to the engine")]
    NoActiveState,

    #[error("`state` can only be written with a state value, got {got}")]
    StateReplaced { got: &'static str },

    #[error("state is already borrowed mutably")]
    StateBorrowed,

    #[error("{signal} signal raised by a {event} handler escaped its scope")]
    UncaughtSignal { signal: Signal, event: Event },
}

/// Why a handler did not produce a value.
///
/// `Skip` is absorbed by the dispatcher, `EndIteration`/`EndRun` by the run
/// loop. `Fault` is never intercepted and aborts the run with the inner error
/// untouched.
#[derive(Error, Debug)]
pub enum Interrupt {
    #[error("handler filtered out")]
    Skip,

    #[error("end of iteration loop requested")]
    EndIteration,

    #[error("end of run requested")]
    EndRun,

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl Interrupt {
    pub(crate) fn signal(&self) -> Option<Signal> {
        match self {
            Interrupt::EndIteration => Some(Signal::EndIteration),
            Interrupt::EndRun => Some(Signal::EndRun),
            _ => None,
        }
    }

    /// Turn anything that reached the top of the run into a plain error.
    pub(crate) fn into_fault(self, event: Event) -> anyhow::Error {
        match self.signal() {
            Some(signal) => EngineError::UncaughtSignal { signal, event }.into(),
            None => match self {
                Interrupt::Fault(err) => err,
                other => anyhow::Error::new(other),
            },
        }
    }
}

impl From<EngineError> for Interrupt {
    fn from(err: EngineError) -> Self {
        Interrupt::Fault(err.into())
    }
}
