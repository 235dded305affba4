//! The closed event vocabulary and the registration targets built from it.

use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::traits::Counter;

/// A named point in the run/epoch/iteration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    RunStarted,
    EpochStarted,
    GetBatchStarted,
    GetBatch,
    GetBatchCompleted,
    IterationStarted,
    Process,
    IterationCompleted,
    Checkpoint,
    EpochCompleted,
    RunTerminated,
    RunCompleted,
}

impl Event {
    /// Every event, in catalogue order.
    pub const ALL: [Event; 12] = [
        Event::RunStarted,
        Event::EpochStarted,
        Event::GetBatchStarted,
        Event::GetBatch,
        Event::GetBatchCompleted,
        Event::IterationStarted,
        Event::Process,
        Event::IterationCompleted,
        Event::Checkpoint,
        Event::EpochCompleted,
        Event::RunTerminated,
        Event::RunCompleted,
    ];

    /// The counter a filter on this event is evaluated against.
    pub fn counter(self) -> Counter {
        match self {
            Event::GetBatchStarted
            | Event::GetBatch
            | Event::GetBatchCompleted
            | Event::IterationStarted
            | Event::Process
            | Event::IterationCompleted
            | Event::Checkpoint => Counter::Step,
            Event::RunStarted
            | Event::EpochStarted
            | Event::EpochCompleted
            | Event::RunTerminated
            | Event::RunCompleted => Counter::Epoch,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Event::RunStarted => "run_started",
            Event::EpochStarted => "epoch_started",
            Event::GetBatchStarted => "get_batch_started",
            Event::GetBatch => "get_batch",
            Event::GetBatchCompleted => "get_batch_completed",
            Event::IterationStarted => "iteration_started",
            Event::Process => "process",
            Event::IterationCompleted => "iteration_completed",
            Event::Checkpoint => "checkpoint",
            Event::EpochCompleted => "epoch_completed",
            Event::RunTerminated => "run_terminated",
            Event::RunCompleted => "run_completed",
        }
    }

    /// Gate on an arbitrary predicate over the engine and this event's counter.
    pub fn filter<S, F>(self, predicate: F) -> FilteredEvent<S>
    where
        F: Fn(&Engine<S>, u64) -> bool + 'static,
    {
        FilteredEvent {
            event: self,
            predicate: Rc::new(predicate),
        }
    }

    /// Fire only when the counter is a multiple of `n`. `every(0)` never fires.
    pub fn every<S>(self, n: u64) -> FilteredEvent<S> {
        self.filter(move |_, value| value.checked_rem(n) == Some(0))
    }

    /// Fire only when the counter equals `n`.
    pub fn once<S>(self, n: u64) -> FilteredEvent<S> {
        self.filter(move |_, value| value == n)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Several events sharing one registration. Only meaningful at registration
/// time; the registry stores one entry per member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventGroup(Vec<Event>);

impl EventGroup {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self(events.into_iter().collect())
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl BitOr for Event {
    type Output = EventGroup;

    fn bitor(self, rhs: Event) -> EventGroup {
        EventGroup(vec![self, rhs])
    }
}

impl BitOr<Event> for EventGroup {
    type Output = EventGroup;

    fn bitor(mut self, rhs: Event) -> EventGroup {
        self.0.push(rhs);
        self
    }
}

pub type Predicate<S> = Rc<dyn Fn(&Engine<S>, u64) -> bool>;

/// An event paired with a counter predicate.
pub struct FilteredEvent<S> {
    pub(crate) event: Event,
    pub(crate) predicate: Predicate<S>,
}

impl<S> FilteredEvent<S> {
    pub fn event(&self) -> Event {
        self.event
    }
}

impl<S> Clone for FilteredEvent<S> {
    fn clone(&self) -> Self {
        Self {
            event: self.event,
            predicate: Rc::clone(&self.predicate),
        }
    }
}

impl<S> fmt::Debug for FilteredEvent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredEvent")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Anything a handler can be registered against.
///
/// `Many` is what `|` builds once a filtered event is involved; each member
/// keeps its own filter.
pub enum EventTarget<S> {
    Single(Event),
    Group(EventGroup),
    Filtered(FilteredEvent<S>),
    Many(Vec<EventTarget<S>>),
}

impl<S> EventTarget<S> {
    fn join(self, rhs: EventTarget<S>) -> EventTarget<S> {
        match self {
            EventTarget::Many(mut targets) => {
                targets.push(rhs);
                EventTarget::Many(targets)
            }
            other => EventTarget::Many(vec![other, rhs]),
        }
    }
}

impl<S> BitOr<FilteredEvent<S>> for Event {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: FilteredEvent<S>) -> EventTarget<S> {
        EventTarget::from(self).join(rhs.into())
    }
}

impl<S> BitOr<FilteredEvent<S>> for EventGroup {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: FilteredEvent<S>) -> EventTarget<S> {
        EventTarget::from(self).join(rhs.into())
    }
}

impl<S> BitOr<Event> for FilteredEvent<S> {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: Event) -> EventTarget<S> {
        EventTarget::from(self).join(rhs.into())
    }
}

impl<S> BitOr for FilteredEvent<S> {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: FilteredEvent<S>) -> EventTarget<S> {
        EventTarget::from(self).join(rhs.into())
    }
}

impl<S> BitOr<Event> for EventTarget<S> {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: Event) -> EventTarget<S> {
        self.join(rhs.into())
    }
}

impl<S> BitOr<FilteredEvent<S>> for EventTarget<S> {
    type Output = EventTarget<S>;

    fn bitor(self, rhs: FilteredEvent<S>) -> EventTarget<S> {
        self.join(rhs.into())
    }
}

impl<S> From<Event> for EventTarget<S> {
    fn from(event: Event) -> Self {
        EventTarget::Single(event)
    }
}

impl<S> From<EventGroup> for EventTarget<S> {
    fn from(group: EventGroup) -> Self {
        EventTarget::Group(group)
    }
}

impl<S> From<FilteredEvent<S>> for EventTarget<S> {
    fn from(filtered: FilteredEvent<S>) -> Self {
        EventTarget::Filtered(filtered)
    }
}
