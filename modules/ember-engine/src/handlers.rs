//! Built-in handlers.
//!
//! The three `update_*` handlers are registered by [`Engine::new`] and are
//! the only code that advances the counters. Each reads `state`, changes it,
//! and returns it to be written back to `state`.
//!
//! [`epoch_length`] and [`max_epochs`] are stock termination policies. The
//! loop never ends on its own, so a caller normally registers both:
//!
//! ```rust
//! use ember_engine::{handlers, Counters, Engine, Event, STATE};
//!
//! let mut engine = Engine::<Counters>::new();
//! engine.register(Event::IterationCompleted, handlers::epoch_length::<Counters>(3), STATE, ());
//! engine.register(Event::EpochCompleted, handlers::max_epochs::<Counters>(2), STATE, ());
//!
//! let state = engine.run(Counters::default()).unwrap();
//! assert_eq!((state.step, state.epoch, state.iteration), (6, 2, 0));
//! ```
//!
//! [`Engine::new`]: crate::Engine::new

use crate::error::Interrupt;
use crate::registry::HandlerResult;
use crate::traits::EngineState;
use crate::value::{Args, Value};

pub fn update_step<S: EngineState>(mut args: Args<'_, S>) -> HandlerResult<S> {
    let mut state = args.take_state(0)?;
    state.counters_mut().step += 1;
    Ok(Value::State(state))
}

pub fn update_iteration<S: EngineState>(mut args: Args<'_, S>) -> HandlerResult<S> {
    let mut state = args.take_state(0)?;
    state.counters_mut().iteration += 1;
    Ok(Value::State(state))
}

pub fn update_epoch<S: EngineState>(mut args: Args<'_, S>) -> HandlerResult<S> {
    let mut state = args.take_state(0)?;
    let counters = state.counters_mut();
    counters.epoch += 1;
    counters.iteration = 0;
    Ok(Value::State(state))
}

/// Ends the epoch once `state.iteration >= n`. Bind `state`; no outputs.
///
/// Register after the default handlers on `IterationCompleted` so it sees the
/// incremented iteration.
pub fn epoch_length<S: EngineState>(n: u64) -> impl Fn(Args<'_, S>) -> HandlerResult<S> {
    move |args: Args<'_, S>| -> HandlerResult<S> {
        if args.state(0)?.counters().iteration >= n {
            Err(Interrupt::EndIteration)
        } else {
            Ok(Value::Unit)
        }
    }
}

/// Ends the run once `state.epoch >= n`. Bind `state`; no outputs.
pub fn max_epochs<S: EngineState>(n: u64) -> impl Fn(Args<'_, S>) -> HandlerResult<S> {
    move |args: Args<'_, S>| -> HandlerResult<S> {
        if args.state(0)?.counters().epoch >= n {
            Err(Interrupt::EndRun)
        } else {
            Ok(Value::Unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::engine::Engine;
    use crate::traits::Counters;
    use crate::value::Arg;

    fn call<F>(engine: &Engine<Counters>, handler: F, state: Counters) -> HandlerResult<Counters>
    where
        F: Fn(Args<'_, Counters>) -> HandlerResult<Counters>,
    {
        let cell = RefCell::new(state);
        handler(Args::new(engine, vec![Arg::State(&cell)]))
    }

    fn counters(step: u64, epoch: u64, iteration: u64) -> Counters {
        Counters {
            step,
            epoch,
            iteration,
        }
    }

    #[test]
    fn update_step_increments_only_step() {
        let engine = Engine::new();
        let out = call(&engine, update_step, counters(4, 1, 2)).unwrap();
        assert_eq!(out, Value::State(counters(5, 1, 2)));
    }

    #[test]
    fn update_iteration_increments_only_iteration() {
        let engine = Engine::new();
        let out = call(&engine, update_iteration, counters(4, 1, 2)).unwrap();
        assert_eq!(out, Value::State(counters(4, 1, 3)));
    }

    #[test]
    fn update_epoch_advances_epoch_and_resets_iteration() {
        let engine = Engine::new();
        let out = call(&engine, update_epoch, counters(9, 1, 3)).unwrap();
        assert_eq!(out, Value::State(counters(9, 2, 0)));
    }

    #[test]
    fn update_without_state_is_a_fault() {
        let engine = Engine::<Counters>::new();
        let result = update_step(Args::new(&engine, vec![Arg::Absent]));
        assert!(matches!(result, Err(Interrupt::Fault(_))));
    }

    #[test]
    fn epoch_length_signals_at_threshold() {
        let engine = Engine::new();
        let policy = epoch_length::<Counters>(3);
        assert!(matches!(call(&engine, &policy, counters(0, 0, 2)), Ok(Value::Unit)));
        assert!(matches!(
            call(&engine, &policy, counters(0, 0, 3)),
            Err(Interrupt::EndIteration)
        ));
    }

    #[test]
    fn max_epochs_signals_at_threshold() {
        let engine = Engine::new();
        let policy = max_epochs::<Counters>(2);
        assert!(matches!(call(&engine, &policy, counters(0, 1, 0)), Ok(Value::Unit)));
        assert!(matches!(
            call(&engine, &policy, counters(0, 2, 0)),
            Err(Interrupt::EndRun)
        ));
    }
}
