//! Calendar of environment events.
//!
//! The schedule is the environment pseudo-actor: it fires fixed events at
//! fixed steps regardless of the state, and its events bypass governance.

use crate::events::Event;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One calendar entry, as written in scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub step: u64,
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(step: u64, event: Event) -> Self {
        Self { step, event }
    }
}

/// `step -> [Event]` mapping. Events at the same step fire in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSchedule {
    calendar: BTreeMap<u64, Vec<Event>>,
}

impl EventSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[ScheduledEvent]) -> Self {
        let mut schedule = Self::new();
        for entry in entries {
            schedule.insert(entry.step, entry.event.clone());
        }
        schedule
    }

    pub fn insert(&mut self, step: u64, event: Event) {
        self.calendar.entry(step).or_default().push(event);
    }

    /// Events due at `step`.
    pub fn events_at(&self, step: u64) -> &[Event] {
        self.calendar.get(&step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.calendar.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.calendar.is_empty()
    }

    /// Last step with a scheduled event.
    pub fn last_step(&self) -> Option<u64> {
        self.calendar.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_at_keeps_order() {
        let schedule = EventSchedule::from_entries(&[
            ScheduledEvent::new(5, Event::demand_shock("a", 0.3)),
            ScheduledEvent::new(2, Event::patch("b")),
            ScheduledEvent::new(5, Event::refactor("a")),
        ]);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.events_at(5), &[Event::demand_shock("a", 0.3), Event::refactor("a")]);
        assert!(schedule.events_at(3).is_empty());
        assert_eq!(schedule.last_step(), Some(5));
    }
}
