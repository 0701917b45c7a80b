//! The event queue (§4.1): a min-heap of timestamped events with deterministic
//! tie-breaking on kind, then insertion order.
//!
//! A `ScheduledEvent`-style wrapper with a reversed `Ord` feeds
//! `std::collections::BinaryHeap` directly as a min-heap; periodic kinds
//! repost themselves with a fixed period after each pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::sim::entities::{BatteryId, RobotId, VehicleId};

/// The kinds of event the kernel loop dispatches, in the fixed tie-break order of §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    UpdateStatus,
    UpdatePriorities,
    VehicleArrival,
    TaskCompletion,
    BatteryCharged,
    VehicleDeparture,
    AssignTasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPayload {
    Vehicle(VehicleId),
    Robot(RobotId),
    Battery(BatteryId),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: u32,
    pub kind: EventKind,
    pub payload: EventPayload,
    /// Monotonically increasing insertion sequence, the final tie-break after
    /// `(time, kind)` so that events of the same kind fire in posted order.
    pub sequence: u64,
}

impl Event {
    pub fn new(time: u32, kind: EventKind, payload: EventPayload, sequence: u64) -> Self {
        Self { time, kind, payload, sequence }
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on time.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.kind.cmp(&self.kind))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Fixed repost periods for the three periodic event kinds (§4.1).
pub fn repost_period(kind: EventKind) -> Option<u32> {
    match kind {
        EventKind::UpdateStatus => Some(1),
        EventKind::UpdatePriorities => Some(5),
        EventKind::AssignTasks => Some(2),
        _ => None,
    }
}

/// Min-heap of scheduled events plus a monotonic sequence counter for deterministic
/// same-kind tie-breaking.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), next_sequence: 0 }
    }

    pub fn push(&mut self, time: u32, kind: EventKind, payload: EventPayload) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Event::new(time, kind, payload, sequence));
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&Event> {
        self.heap.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_time_pops_first() {
        let mut q = EventQueue::new();
        q.push(10, EventKind::AssignTasks, EventPayload::None);
        q.push(5, EventKind::AssignTasks, EventPayload::None);
        let first = q.pop().unwrap();
        assert_eq!(first.time, 5);
    }

    #[test]
    fn same_time_breaks_ties_by_kind_order() {
        let mut q = EventQueue::new();
        q.push(10, EventKind::AssignTasks, EventPayload::None);
        q.push(10, EventKind::VehicleArrival, EventPayload::None);
        q.push(10, EventKind::UpdateStatus, EventPayload::None);
        assert_eq!(q.pop().unwrap().kind, EventKind::UpdateStatus);
        assert_eq!(q.pop().unwrap().kind, EventKind::VehicleArrival);
        assert_eq!(q.pop().unwrap().kind, EventKind::AssignTasks);
    }

    #[test]
    fn same_time_same_kind_preserves_posting_order() {
        let mut q = EventQueue::new();
        q.push(10, EventKind::VehicleArrival, EventPayload::Vehicle(1));
        q.push(10, EventKind::VehicleArrival, EventPayload::Vehicle(2));
        assert_eq!(q.pop().unwrap().payload, EventPayload::Vehicle(1));
        assert_eq!(q.pop().unwrap().payload, EventPayload::Vehicle(2));
    }

    #[test]
    fn periodic_kinds_have_fixed_repost_periods() {
        assert_eq!(repost_period(EventKind::UpdateStatus), Some(1));
        assert_eq!(repost_period(EventKind::UpdatePriorities), Some(5));
        assert_eq!(repost_period(EventKind::AssignTasks), Some(2));
        assert_eq!(repost_period(EventKind::VehicleArrival), None);
    }
}
