//! Priority-ordered events for the discrete-event kernel.
//!
//! Time is measured in picoseconds (`u64`) to match the optical and classical
//! channel delays used throughout the network layer. Events are ordered by
//! `(time, priority, seq)`; `seq` is a monotonic insertion counter so that two
//! events scheduled for the same `(time, priority)` fire in the order they were
//! scheduled, never arbitrarily.

use std::cmp::Ordering;

/// What happens when an event fires, addressed to a named entity.
///
/// Kept as a closed enum (rather than a trait-object "observer" callback) per the
/// kernel's event-as-continuation design: a resume point is data, not a virtual
/// method, so replaying or inspecting a pending event never requires dynamic
/// dispatch.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Fired once per entity during `Timeline::init`.
    Init,
    /// A classical message has arrived at `target` after channel delay.
    MessageArrival { src: String, message: crate::resource::protocol::Message },
    /// A photon emitted by a memory has reached a quantum channel's far end.
    PhotonArrival { photon: crate::components::photon::Photon },
    /// A detector registered a click (or none); delivered to the owning BSM.
    DetectorClick { detector: usize, outcome: Option<bool> },
    /// A BSM has resolved both detector clicks into an entanglement-generation
    /// result for the named generation protocol waiting on this midpoint.
    BsmResult { protocol_name: String, detector_outcome: Option<bool> },
    /// Re-emit the next photon in an entanglement-generation attempt.
    EmitPhoton { protocol_name: String, round: u8 },
    /// A memory's reservation window / decoherence budget has elapsed.
    MemoryExpire { memo_index: usize },
    /// A protocol reports a local memory's new occupancy state back to the
    /// owning node's resource manager — the continuation generation,
    /// purification and swapping use to cross back from "owned by a
    /// protocol" to "owned by the node" without a second mutable borrow.
    MemoryUpdated { memo_index: usize, update: crate::resource::memory_info::MemoryUpdate },
    /// A rule's validity window has elapsed; release everything it spawned.
    RuleExpire { rule_id: u64 },
    /// A reservation's end_time has been reached.
    ReservationExpire { reservation_id: u64 },
    /// Periodic OSPF HELLO transmission.
    SendHello,
    /// Periodic LSA self-refresh (before `MAX_AGE`).
    RefreshLsa,
    /// Neighbor liveness check scheduled `DEAD_INTERVAL` after the last HELLO.
    CheckNeighborLiveness { neighbor: String, last_hello_time: u64 },
}

/// A scheduled occurrence in a [`Timeline`].
#[derive(Debug, Clone)]
pub struct Event {
    pub time: u64,
    pub priority: u32,
    pub(crate) seq: u64,
    pub target: String,
    pub kind: EventKind,
}

impl Event {
    pub fn new(time: u64, priority: u32, target: impl Into<String>, kind: EventKind) -> Self {
        Self {
            time,
            priority,
            seq: 0,
            target: target.into(),
            kind,
        }
    }
}

/// Opaque handle to a scheduled [`Event`], returned by
/// [`super::timeline::Timeline::schedule`] so the event can later be
/// cancelled or rescheduled via `update_event_time` without the caller
/// tracking `(time, priority, target)` tuples by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) u64);

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    /// `BinaryHeap` is a max-heap; reverse the natural `(time, priority, seq)`
    /// ordering so the *smallest* tuple is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
