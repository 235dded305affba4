//! Per-event handler lists.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::Interrupt;
use crate::events::{Event, EventTarget, Predicate};
use crate::traits::EngineState;
use crate::value::{Args, Binding, Value};

pub type HandlerResult<S> = Result<Value<S>, Interrupt>;

/// A registered handler. Shared so one handler can sit under many events.
pub type HandlerFn<S> = Rc<dyn for<'a> Fn(Args<'a, S>) -> HandlerResult<S>>;

/// A handler together with where its arguments come from and where its
/// result goes.
pub struct HandlerEntry<S> {
    pub(crate) handler: HandlerFn<S>,
    pub(crate) inputs: Vec<Binding>,
    pub(crate) outputs: Vec<String>,
}

impl<S> HandlerEntry<S> {
    pub fn inputs(&self) -> &[Binding] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

impl<S> Clone for HandlerEntry<S> {
    fn clone(&self) -> Self {
        Self {
            handler: Rc::clone(&self.handler),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }
}

impl<S> fmt::Debug for HandlerEntry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Insertion order is execution order. Nothing is de-duplicated or removed.
pub struct Registry<S> {
    entries: HashMap<Event, Vec<HandlerEntry<S>>>,
}

impl<S: EngineState> Registry<S> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Groups fan out into one entry per member, in group order. Filtered
    /// targets store the handler behind a filter adapter, including filtered
    /// members of a mixed group.
    pub fn register(
        &mut self,
        target: EventTarget<S>,
        handler: HandlerFn<S>,
        inputs: &[Binding],
        outputs: &[String],
    ) {
        match target {
            EventTarget::Single(event) => self.push(event, handler, inputs, outputs),
            EventTarget::Group(group) => {
                for &event in group.events() {
                    self.push(event, Rc::clone(&handler), inputs, outputs);
                }
            }
            EventTarget::Filtered(filtered) => {
                let wrapped = filter_adapter(handler, filtered.event, filtered.predicate);
                self.push(filtered.event, wrapped, inputs, outputs);
            }
            EventTarget::Many(targets) => {
                for target in targets {
                    self.register(target, Rc::clone(&handler), inputs, outputs);
                }
            }
        }
    }

    fn push(
        &mut self,
        event: Event,
        handler: HandlerFn<S>,
        inputs: &[Binding],
        outputs: &[String],
    ) {
        self.entries.entry(event).or_default().push(HandlerEntry {
            handler,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        });
    }

    pub fn entries(&self, event: Event) -> &[HandlerEntry<S>] {
        self.entries.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry(&self, event: Event, index: usize) -> Option<&HandlerEntry<S>> {
        self.entries(event).get(index)
    }

    pub fn len(&self, event: Event) -> usize {
        self.entries(event).len()
    }
}

impl<S: EngineState> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap `handler` so it only runs when `predicate` holds for the current
/// value of `event`'s counter. Otherwise it returns `Interrupt::Skip`, which
/// the dispatcher absorbs without writing any output.
pub fn filter_adapter<S: EngineState>(
    handler: HandlerFn<S>,
    event: Event,
    predicate: Predicate<S>,
) -> HandlerFn<S> {
    Rc::new(move |args: Args<'_, S>| -> HandlerResult<S> {
        let engine = args.context();
        let value = engine.counter(event)?;
        if predicate(engine, value) {
            handler(args)
        } else {
            trace!(event = %event, counter = value, "Filter rejected handler");
            Err(Interrupt::Skip)
        }
    })
}
