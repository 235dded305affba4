//! The dispatcher and the run loop.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info, trace, warn};

use crate::error::{EngineError, Interrupt};
use crate::events::{Event, EventTarget};
use crate::handlers::{update_epoch, update_iteration, update_step};
use crate::registry::{HandlerFn, HandlerResult, Registry};
use crate::traits::{Counters, EngineState};
use crate::value::{Arg, Args, Binding, IntoNames, Value, BATCH, LAST_EVENT, STATE};

/// Events fired, in order, on every pass of the iteration loop.
const ITERATION_EVENTS: [Event; 7] = [
    Event::GetBatchStarted,
    Event::GetBatch,
    Event::GetBatchCompleted,
    Event::IterationStarted,
    Event::Process,
    Event::IterationCompleted,
    Event::Checkpoint,
];

/// Event-driven epoch/iteration loop.
///
/// Handlers are registered per event with named input and output bindings.
/// Inputs are read from the engine's attribute map (or are the engine
/// itself); return values are written back into it. The state passed to
/// [`Engine::run`] is held in a single cell until the run returns. Every
/// handler bound to `state` sees that one cell, so in-place changes are
/// visible to the handlers after it.
pub struct Engine<S> {
    registry: RefCell<Registry<S>>,
    attrs: HashMap<String, Value<S>>,
    state: Option<RefCell<S>>,
}

impl<S: EngineState> Engine<S> {
    /// An engine with the counter-maintaining handlers already registered.
    pub fn new() -> Self {
        let engine = Self {
            registry: RefCell::new(Registry::new()),
            attrs: HashMap::new(),
            state: None,
        };
        engine.register(Event::IterationCompleted, update_step::<S>, STATE, STATE);
        engine.register(Event::IterationCompleted, update_iteration::<S>, STATE, STATE);
        engine.register(Event::EpochCompleted, update_epoch::<S>, STATE, STATE);
        engine
    }

    /// Append `handler` to every event named by `target`.
    ///
    /// Takes `&self` so a handler bound to `engine` can register more
    /// handlers while a run is in progress. Binding names are not checked
    /// here; unknown inputs resolve as absent at dispatch time.
    pub fn register<T, F, I, O>(&self, target: T, handler: F, inputs: I, outputs: O)
    where
        T: Into<EventTarget<S>>,
        F: for<'a> Fn(Args<'a, S>) -> HandlerResult<S> + 'static,
        I: IntoNames,
        O: IntoNames,
    {
        self.register_shared(target, Rc::new(handler), inputs, outputs);
    }

    /// Like [`Engine::register`], for a handler that is already shared.
    pub fn register_shared<T, I, O>(&self, target: T, handler: HandlerFn<S>, inputs: I, outputs: O)
    where
        T: Into<EventTarget<S>>,
        I: IntoNames,
        O: IntoNames,
    {
        let inputs: Vec<Binding> = inputs.into_names().into_iter().map(Binding::from).collect();
        let outputs = outputs.into_names();
        self.registry
            .borrow_mut()
            .register(target.into(), handler, &inputs, &outputs);
    }

    /// Builder form of [`Engine::register`].
    pub fn on<T: Into<EventTarget<S>>>(&self, target: T) -> On<'_, S> {
        On {
            engine: self,
            target: target.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn handler_count(&self, event: Event) -> usize {
        self.registry.borrow().len(event)
    }

    pub fn attr(&self, name: &str) -> Option<&Value<S>> {
        self.attrs.get(name)
    }

    /// `state` is not an attribute: a value set under that name is never
    /// bound to a handler.
    pub fn set_attr(&mut self, name: impl Into<String>, value: Value<S>) -> Option<Value<S>> {
        self.attrs.insert(name.into(), value)
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Value<S>> {
        self.attrs.remove(name)
    }

    /// The attached state. `None` outside a run, or while a handler holds it
    /// mutably.
    pub fn state(&self) -> Option<Ref<'_, S>> {
        self.state.as_ref()?.try_borrow().ok()
    }

    pub fn batch(&self) -> Option<&Value<S>> {
        self.attrs.get(BATCH)
    }

    pub fn last_event(&self) -> Option<Event> {
        match self.attrs.get(LAST_EVENT) {
            Some(Value::Event(event)) => Some(*event),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    /// Current value of the counter `event` is filtered on.
    pub fn counter(&self, event: Event) -> Result<u64, EngineError> {
        let cell = self.state.as_ref().ok_or(EngineError::NoActiveState)?;
        let state = cell.try_borrow().map_err(|_| EngineError::StateBorrowed)?;
        Ok(state.counters().get(event.counter()))
    }

    fn counters(&self) -> Counters {
        self.state()
            .map(|state| *state.counters())
            .unwrap_or_default()
    }

    fn lookup(&self, binding: &Binding) -> Arg<'_, S> {
        match binding {
            Binding::Engine => Arg::Engine(self),
            Binding::Attr(name) if name == STATE => match &self.state {
                Some(cell) => Arg::State(cell),
                None => Arg::Absent,
            },
            Binding::Attr(name) => match self.attrs.get(name) {
                Some(value) => Arg::Value(value.clone()),
                None => Arg::Absent,
            },
        }
    }

    /// Invoke every handler registered for `event`, in registration order.
    ///
    /// Filtered-out handlers are skipped silently. Scope-exit signals and
    /// faults stop the remaining handlers and are returned to the caller.
    pub fn fire_event(&mut self, event: Event) -> Result<(), Interrupt> {
        self.attrs.insert(LAST_EVENT.to_string(), Value::Event(event));
        trace!(event = %event, handlers = self.handler_count(event), "Firing event");

        // Walk by index: handlers may append to this very list while it runs.
        let mut index = 0;
        loop {
            let Some(entry) = self.registry.borrow().entry(event, index).cloned() else {
                break;
            };
            index += 1;

            let result = {
                let values = entry.inputs.iter().map(|binding| self.lookup(binding)).collect();
                (entry.handler)(Args::new(self, values))
            };

            match result {
                Ok(value) => self.bind_outputs(&entry.outputs, value)?,
                Err(Interrupt::Skip) => {
                    trace!(event = %event, index = index - 1, "Handler skipped");
                }
                Err(interrupt) => return Err(interrupt),
            }
        }
        Ok(())
    }

    fn bind_outputs(&mut self, outputs: &[String], value: Value<S>) -> Result<(), EngineError> {
        match outputs {
            [] => {}
            [name] => self.write(name, value)?,
            names => match value {
                Value::Tuple(items) => {
                    for (name, item) in names.iter().zip(items) {
                        self.write(name, item)?;
                    }
                }
                other => {
                    return Err(EngineError::NotMultiValued {
                        count: names.len(),
                        got: other.kind(),
                    })
                }
            },
        }
        Ok(())
    }

    /// Writes to `state` replace the attached state and must carry one.
    fn write(&mut self, name: &str, value: Value<S>) -> Result<(), EngineError> {
        if name != STATE {
            self.attrs.insert(name.to_string(), value);
            return Ok(());
        }
        let cell = self.state.as_mut().ok_or(EngineError::NoActiveState)?;
        match value {
            Value::State(state) => {
                *cell.get_mut() = state;
                Ok(())
            }
            other => Err(EngineError::StateReplaced { got: other.kind() }),
        }
    }

    /// Drive epochs and iterations until a handler ends the run.
    ///
    /// Returns the final state. The state is detached from the engine on every
    /// exit path; a handler fault is returned exactly as the handler raised it,
    /// without firing `RunTerminated` or `RunCompleted`.
    pub fn run(&mut self, state: S) -> Result<S> {
        let start = *state.counters();
        info!(
            step = start.step,
            epoch = start.epoch,
            iteration = start.iteration,
            "Run starting"
        );

        self.state = Some(RefCell::new(state));
        let outcome = self.drive();
        let detached = self.state.take();
        outcome?;

        let state = detached.ok_or(EngineError::NoActiveState)?.into_inner();
        let end = state.counters();
        info!(
            step = end.step,
            epoch = end.epoch,
            iteration = end.iteration,
            "Run completed"
        );
        Ok(state)
    }

    fn drive(&mut self) -> Result<()> {
        let interrupt = match self.run_epochs() {
            Ok(never) => match never {},
            Err(interrupt) => interrupt,
        };

        match interrupt {
            Interrupt::EndRun => {
                let counters = self.counters();
                info!(step = counters.step, epoch = counters.epoch, "Run terminated");
                self.fire(Event::RunTerminated)?;
            }
            other => return Err(self.abort(other)),
        }

        self.fire(Event::RunCompleted)
    }

    fn run_epochs(&mut self) -> Result<Infallible, Interrupt> {
        self.fire_event(Event::RunStarted)?;
        loop {
            self.fire_event(Event::EpochStarted)?;
            debug!(epoch = self.counters().epoch, "Epoch started");

            match self.run_iterations() {
                Ok(never) => match never {},
                Err(Interrupt::EndIteration) => {}
                Err(interrupt) => return Err(interrupt),
            }

            self.fire_event(Event::EpochCompleted)?;
            let counters = self.counters();
            debug!(epoch = counters.epoch, step = counters.step, "Epoch completed");
        }
    }

    fn run_iterations(&mut self) -> Result<Infallible, Interrupt> {
        loop {
            self.attrs.remove(BATCH);
            for event in ITERATION_EVENTS {
                self.fire_event(event)?;
            }
        }
    }

    /// Fire an event at run scope, where no signal is caught any more.
    fn fire(&mut self, event: Event) -> Result<()> {
        self.fire_event(event).map_err(|interrupt| self.abort(interrupt))
    }

    fn abort(&self, interrupt: Interrupt) -> anyhow::Error {
        let event = self.last_event().unwrap_or(Event::RunStarted);
        let err = interrupt.into_fault(event);
        warn!(event = %event, error = %err, "Run aborted");
        err
    }
}

impl<S: EngineState> Default for Engine<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending registration built by [`Engine::on`].
pub struct On<'e, S> {
    engine: &'e Engine<S>,
    target: EventTarget<S>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl<S: EngineState> On<'_, S> {
    pub fn reads(mut self, names: impl IntoNames) -> Self {
        self.inputs.extend(names.into_names());
        self
    }

    pub fn writes(mut self, names: impl IntoNames) -> Self {
        self.outputs.extend(names.into_names());
        self
    }

    /// Register `handler` and hand it back, shared, for reuse elsewhere.
    pub fn handle<F>(self, handler: F) -> HandlerFn<S>
    where
        F: for<'a> Fn(Args<'a, S>) -> HandlerResult<S> + 'static,
    {
        let handler: HandlerFn<S> = Rc::new(handler);
        self.engine
            .register_shared(self.target, Rc::clone(&handler), self.inputs, self.outputs);
        handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn new_engine_registers_counter_handlers() {
        let engine = Engine::<Counters>::new();
        assert_eq!(engine.handler_count(Event::IterationCompleted), 2);
        assert_eq!(engine.handler_count(Event::EpochCompleted), 1);
        assert_eq!(engine.handler_count(Event::Process), 0);
        assert!(!engine.is_running());
    }

    #[test]
    fn fire_event_records_last_event() {
        let mut engine = Engine::<Counters>::new();
        engine.fire_event(Event::Process).unwrap();
        assert_eq!(engine.last_event(), Some(Event::Process));
    }

    #[test]
    fn unknown_binding_resolves_absent() {
        let mut engine = Engine::<Counters>::new();
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        engine.register(
            Event::Process,
            move |args: Args<'_, Counters>| {
                flag.set(args.get(0).is_some_and(Arg::is_absent));
                Ok(Value::Unit)
            },
            "no_such_attr",
            (),
        );
        engine.fire_event(Event::Process).unwrap();
        assert!(seen.get());
    }

    #[test]
    fn engine_binding_resolves_to_engine() {
        let mut engine = Engine::<Counters>::new();
        engine.set_attr("label", Value::json("hello"));
        engine.register(
            Event::Process,
            |args: Args<'_, Counters>| {
                let engine = args.engine(0)?;
                Ok(engine.attr("label").cloned().unwrap_or(Value::Unit))
            },
            "engine",
            "copied",
        );
        engine.fire_event(Event::Process).unwrap();
        assert_eq!(engine.attr("copied"), Some(&Value::json("hello")));
    }

    #[test]
    fn single_output_assigns_whole_result() {
        let mut engine = Engine::<Counters>::new();
        engine.register(
            Event::Process,
            |_args: Args<'_, Counters>| Ok(Value::Tuple(vec![Value::json(1), Value::json(2)])),
            (),
            "pair",
        );
        engine.fire_event(Event::Process).unwrap();
        assert_eq!(
            engine.attr("pair"),
            Some(&Value::Tuple(vec![Value::json(1), Value::json(2)]))
        );
    }

    #[test]
    fn no_outputs_discards_result() {
        let mut engine = Engine::<Counters>::new();
        engine.register(
            Event::Process,
            |_args: Args<'_, Counters>| Ok(Value::json(5)),
            (),
            (),
        );
        engine.fire_event(Event::Process).unwrap();
        assert_eq!(engine.attrs.len(), 1, "only last_event is set");
    }

    #[test]
    fn multiple_outputs_need_a_tuple() {
        let mut engine = Engine::<Counters>::new();
        engine.register(
            Event::Process,
            |_args: Args<'_, Counters>| Ok(Value::json(5)),
            (),
            ["a", "b"],
        );
        let err = engine.fire_event(Event::Process).unwrap_err();
        let Interrupt::Fault(err) = err else {
            panic!("expected fault");
        };
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NotMultiValued { count: 2, got: "json" })
        ));
    }

    #[test]
    fn filter_outside_run_is_a_fault() {
        let mut engine = Engine::<Counters>::new();
        engine.register(
            Event::Process.every::<Counters>(2),
            |_args: Args<'_, Counters>| Ok(Value::Unit),
            (),
            (),
        );
        let err = engine.fire_event(Event::Process).unwrap_err();
        let Interrupt::Fault(err) = err else {
            panic!("expected fault");
        };
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NoActiveState)
        ));
    }

    #[test]
    fn handler_registered_mid_fire_runs_in_same_fire() {
        let mut engine = Engine::<Counters>::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        engine.register(
            Event::Process,
            move |args: Args<'_, Counters>| {
                let engine = args.engine(0)?;
                let counter = Rc::clone(&counter);
                engine.register(
                    Event::Process,
                    move |_args: Args<'_, Counters>| {
                        counter.set(counter.get() + 1);
                        Ok(Value::Unit)
                    },
                    (),
                    (),
                );
                Ok(Value::Unit)
            },
            "engine",
            (),
        );

        engine.fire_event(Event::Process).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(engine.handler_count(Event::Process), 2);
    }

    #[test]
    fn on_builder_registers_and_returns_handler() {
        let mut engine = Engine::<Counters>::new();
        let handler = engine
            .on(Event::GetBatch)
            .reads("engine")
            .writes("batch")
            .handle(|_args: Args<'_, Counters>| Ok(Value::Json(serde_json::json!([1, 2, 3]))));
        engine.register_shared(Event::Checkpoint, handler, "engine", "copy");

        engine.fire_event(Event::GetBatch).unwrap();
        engine.fire_event(Event::Checkpoint).unwrap();
        assert_eq!(engine.batch(), Some(&Value::Json(serde_json::json!([1, 2, 3]))));
        assert_eq!(engine.attr("copy"), Some(&Value::Json(serde_json::json!([1, 2, 3]))));
    }
}
