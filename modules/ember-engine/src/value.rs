//! Attribute values, binding keys and the resolved argument list a handler sees.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::events::Event;

/// Binding key that resolves to the engine itself.
pub const ENGINE: &str = "engine";
/// Attribute holding the state for the duration of a run.
pub const STATE: &str = "state";
/// Attribute holding the current batch. Cleared at the start of every iteration.
pub const BATCH: &str = "batch";
/// Attribute holding the most recently fired event.
pub const LAST_EVENT: &str = "last_event";

/// A value stored in the engine's attribute map or returned by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<S> {
    Unit,
    State(S),
    Event(Event),
    Json(serde_json::Value),
    /// Multi-valued result, distributed position by position over several
    /// output bindings.
    Tuple(Vec<Value<S>>),
}

impl<S> Value<S> {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::State(_) => "state",
            Value::Event(_) => "event",
            Value::Json(_) => "json",
            Value::Tuple(_) => "tuple",
        }
    }

    pub fn json(value: impl Into<serde_json::Value>) -> Self {
        Value::Json(value.into())
    }

    pub fn as_state(&self) -> Option<&S> {
        match self {
            Value::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }
}

impl<S> From<serde_json::Value> for Value<S> {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl<S> From<Event> for Value<S> {
    fn from(event: Event) -> Self {
        Value::Event(event)
    }
}

impl<S> From<()> for Value<S> {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

/// An input binding key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Binding {
    /// The engine itself.
    Engine,
    /// A named attribute, read at dispatch time. Missing names bind as absent.
    Attr(String),
}

impl From<&str> for Binding {
    fn from(name: &str) -> Self {
        if name == ENGINE {
            Binding::Engine
        } else {
            Binding::Attr(name.to_string())
        }
    }
}

impl From<String> for Binding {
    fn from(name: String) -> Self {
        if name == ENGINE {
            Binding::Engine
        } else {
            Binding::Attr(name)
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Engine => f.write_str(ENGINE),
            Binding::Attr(name) => f.write_str(name),
        }
    }
}

/// One name or a sequence of names. A single name becomes a one-element list.
pub trait IntoNames {
    fn into_names(self) -> Vec<String>;
}

impl IntoNames for () {
    fn into_names(self) -> Vec<String> {
        Vec::new()
    }
}

impl IntoNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> IntoNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl IntoNames for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl IntoNames for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

/// A resolved positional argument.
pub enum Arg<'a, S> {
    Engine(&'a Engine<S>),
    /// The engine's attached state, shared with every other handler.
    State(&'a RefCell<S>),
    Value(Value<S>),
    Absent,
}

impl<S> Arg<'_, S> {
    pub fn kind(&self) -> &'static str {
        match self {
            Arg::Engine(_) => "engine",
            Arg::State(_) => "state",
            Arg::Value(value) => value.kind(),
            Arg::Absent => "absent",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Arg::Absent)
    }
}

/// The arguments a handler is invoked with, in input-binding order.
pub struct Args<'a, S> {
    engine: &'a Engine<S>,
    values: Vec<Arg<'a, S>>,
}

impl<'a, S> Args<'a, S> {
    pub(crate) fn new(engine: &'a Engine<S>, values: Vec<Arg<'a, S>>) -> Self {
        Self { engine, values }
    }

    /// The engine performing the dispatch, whether or not it was bound.
    pub(crate) fn context(&self) -> &'a Engine<S> {
        self.engine
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg<'a, S>> {
        self.values.get(index)
    }

    /// Move an argument out, leaving `Absent` behind. Out of range reads as absent.
    pub fn take(&mut self, index: usize) -> Arg<'a, S> {
        match self.values.get_mut(index) {
            Some(slot) => std::mem::replace(slot, Arg::Absent),
            None => Arg::Absent,
        }
    }

    pub fn engine(&self, index: usize) -> Result<&'a Engine<S>, EngineError> {
        match self.values.get(index) {
            Some(Arg::Engine(engine)) => Ok(engine),
            other => Err(EngineError::ArgumentType {
                index,
                expected: "engine",
                got: other.map_or("absent", Arg::kind),
            }),
        }
    }

    /// Read access to the attached state.
    pub fn state(&self, index: usize) -> Result<Ref<'a, S>, EngineError> {
        self.state_cell(index)?
            .try_borrow()
            .map_err(|_| EngineError::StateBorrowed)
    }

    /// Change the attached state in place. No output binding is needed.
    pub fn state_mut(&self, index: usize) -> Result<RefMut<'a, S>, EngineError> {
        self.state_cell(index)?
            .try_borrow_mut()
            .map_err(|_| EngineError::StateBorrowed)
    }

    fn state_cell(&self, index: usize) -> Result<&'a RefCell<S>, EngineError> {
        match self.values.get(index) {
            Some(Arg::State(cell)) => Ok(*cell),
            other => Err(EngineError::ArgumentType {
                index,
                expected: "state",
                got: other.map_or("absent", Arg::kind),
            }),
        }
    }

    /// An owned copy of the state, for handlers that return a changed state
    /// through a `state` output binding.
    pub fn take_state(&mut self, index: usize) -> Result<S, EngineError>
    where
        S: Clone,
    {
        match self.take(index) {
            Arg::State(cell) => cell
                .try_borrow()
                .map(|state| S::clone(&state))
                .map_err(|_| EngineError::StateBorrowed),
            Arg::Value(Value::State(state)) => Ok(state),
            other => Err(EngineError::ArgumentType {
                index,
                expected: "state",
                got: other.kind(),
            }),
        }
    }

    /// `None` when the binding was absent.
    pub fn take_json(&mut self, index: usize) -> Result<Option<serde_json::Value>, EngineError> {
        match self.take(index) {
            Arg::Value(Value::Json(json)) => Ok(Some(json)),
            Arg::Absent => Ok(None),
            other => Err(EngineError::ArgumentType {
                index,
                expected: "json",
                got: other.kind(),
            }),
        }
    }

    pub fn into_vec(self) -> Vec<Arg<'a, S>> {
        self.values
    }
}
