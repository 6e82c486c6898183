//! The discrete-event engine: a priority queue of [`Event`]s drained in
//! `(time, priority, seq)` order against a single monotonic clock (§4.1, §4.4
//! Concurrency & Resource Model — single-threaded within one timeline).

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use crate::quantum::manager::QuantumManagerHandle;

use super::entity::Entity;
use super::event::{Event, EventHandle, EventKind};

/// A run's event loop, entity registry and shared quantum-manager handle.
///
/// Entities are stored as `Box<dyn Entity>` rather than a closed `NodeKind`
/// enum: node types (routers, BSM midpoints, memories) are added
/// independently by different modules, and a trait object keeps the registry
/// open to that without a central enum everyone has to edit.
pub struct Timeline {
    now: u64,
    stop_time: u64,
    seq_counter: u64,
    events: BinaryHeap<Event>,
    /// `seq`s of events cancelled via [`Timeline::cancel`] — `BinaryHeap`
    /// can't remove an arbitrary queued item in place, so a cancelled event
    /// stays in the heap and is skipped when it's popped.
    cancelled: HashSet<u64>,
    entities: HashMap<String, Box<dyn Entity>>,
    pub quantum_manager: Arc<dyn QuantumManagerHandle>,
    initialized: bool,
}

impl Timeline {
    pub fn new(stop_time: u64, quantum_manager: Arc<dyn QuantumManagerHandle>) -> Self {
        Self {
            now: 0,
            stop_time,
            seq_counter: 0,
            events: BinaryHeap::new(),
            cancelled: HashSet::new(),
            entities: HashMap::new(),
            quantum_manager,
            initialized: false,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn stop_time(&self) -> u64 {
        self.stop_time
    }

    pub fn register_entity(&mut self, entity: Box<dyn Entity>) {
        let name = entity.name().to_string();
        self.entities.insert(name, entity);
    }

    pub fn get_entity(&self, name: &str) -> Option<&dyn Entity> {
        self.entities.get(name).map(|e| e.as_ref())
    }

    /// Schedules `event`, rejecting (silently dropping, with a warning) any
    /// event timestamped before the current clock — the kernel has no notion
    /// of retroactive events (§3 invariant). Returns a handle that can later
    /// be passed to [`Timeline::cancel`] or [`Timeline::update_event_time`].
    pub fn schedule(&mut self, mut event: Event) -> EventHandle {
        if event.time < self.now {
            tracing::warn!(target = %event.target, time = event.time, now = self.now, "dropped event scheduled in the past");
            return EventHandle(self.seq_counter);
        }
        event.seq = self.seq_counter;
        self.seq_counter += 1;
        let handle = EventHandle(event.seq);
        self.events.push(event);
        handle
    }

    /// Cancels a previously scheduled event; a no-op if it already fired or
    /// was already cancelled (§4.1's `cancel` operation).
    pub fn cancel(&mut self, handle: EventHandle) {
        self.cancelled.insert(handle.0);
    }

    /// Reschedules an event to a new time: cancels whatever `handle` pointed
    /// at and schedules `new_event` in its place, returning the new handle
    /// (§4.1's `update_event_time` operation). `new_event`'s own `target`
    /// and `kind` carry the rescheduled occurrence; callers typically build
    /// it from the original event with only `time` changed.
    pub fn update_event_time(&mut self, handle: EventHandle, new_event: Event) -> EventHandle {
        self.cancel(handle);
        self.schedule(new_event)
    }

    /// Runs `init()` on every registered entity, in a deterministic order
    /// (sorted by name) so repeated runs with the same registration set
    /// schedule identical initial events regardless of `HashMap` iteration
    /// order.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        let mut names: Vec<String> = self.entities.keys().cloned().collect();
        names.sort();
        for name in names {
            self.run_on_entity(&name, |entity, timeline| entity.init(timeline));
        }
        self.initialized = true;
    }

    /// Drains the event queue up to `stop_time`, dispatching each event to
    /// its target entity.
    ///
    /// Uses the take-mutate-reinsert pattern: the target entity is removed
    /// from `entities` before its `handle_event` runs, so the entity receives
    /// an unaliased `&mut Timeline` (including the ability to re-schedule
    /// itself) without a second mutable borrow of the registry it still
    /// logically belongs to.
    pub fn run(&mut self) {
        if !self.initialized {
            self.init();
        }
        while let Some(event) = self.events.pop() {
            if event.time > self.stop_time {
                self.events.push(event);
                break;
            }
            if self.cancelled.remove(&event.seq) {
                continue;
            }
            self.now = event.time;
            let target = event.target.clone();
            self.run_on_entity(&target, move |entity, timeline| entity.handle_event(timeline, event.kind));
        }
        self.now = self.stop_time;
    }

    /// Advances the clock without firing anything, used by the parallel
    /// barrier algorithm between synchronization rounds.
    pub fn advance_to(&mut self, time: u64) {
        self.now = self.now.max(time);
    }

    /// Drains events up to (and including) `window_end`, the per-round
    /// counterpart to [`Timeline::run`]'s drain to `stop_time`. Used by the
    /// parallel barrier: a timeline may only process events inside the
    /// window the conservative synchronization algorithm just cleared.
    pub fn run_until(&mut self, window_end: u64) {
        if !self.initialized {
            self.init();
        }
        while let Some(event) = self.events.pop() {
            if event.time > window_end {
                self.events.push(event);
                break;
            }
            if self.cancelled.remove(&event.seq) {
                continue;
            }
            self.now = event.time;
            let target = event.target.clone();
            self.run_on_entity(&target, move |entity, timeline| entity.handle_event(timeline, event.kind));
        }
        self.now = self.now.max(window_end.min(self.stop_time));
    }

    /// Peeks the timestamp of the next pending event, if any — the
    /// lookahead value the conservative parallel-synchronization barrier
    /// needs from every peer timeline before it can advance its window.
    pub fn peek_next_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.time)
    }

    /// Number of events still queued, including any already cancelled (they
    /// aren't removed from the heap until popped). Mainly useful for tests
    /// asserting that some code path actually scheduled something.
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    fn run_on_entity(&mut self, name: &str, f: impl FnOnce(&mut dyn Entity, &mut Timeline)) {
        let Some(mut entity) = self.entities.remove(name) else {
            tracing::warn!(target = name, "event delivered to unregistered entity");
            return;
        };
        f(entity.as_mut(), self);
        self.entities.insert(name.to_string(), entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::manager::QuantumManager;
    use crate::quantum::state::Formalism;
    use rand_chacha::ChaCha8Rng;
    use rand::SeedableRng;

    struct Counter {
        name: String,
        ticks: u32,
        rng: ChaCha8Rng,
    }

    impl Entity for Counter {
        fn name(&self) -> &str {
            &self.name
        }
        fn init(&mut self, timeline: &mut Timeline) {
            timeline.schedule(Event::new(10, 0, self.name.clone(), EventKind::Init));
        }
        fn handle_event(&mut self, timeline: &mut Timeline, _kind: EventKind) {
            self.ticks += 1;
            if self.ticks < 3 {
                let next = timeline.now() + 10;
                timeline.schedule(Event::new(next, 0, self.name.clone(), EventKind::Init));
            }
        }
        fn rng_mut(&mut self) -> &mut ChaCha8Rng {
            &mut self.rng
        }
    }

    #[test]
    fn events_fire_in_time_order_and_self_reschedule() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        timeline.register_entity(Box::new(Counter {
            name: "c1".into(),
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }));
        timeline.run();
        assert_eq!(timeline.now(), 1000);
    }

    #[test]
    fn events_scheduled_in_the_past_are_dropped() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(100, qm);
        timeline.now = 50;
        timeline.schedule(Event::new(10, 0, "nobody", EventKind::Init));
        assert!(timeline.events.is_empty());
    }

    #[test]
    fn cancelled_event_never_reaches_its_entity() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        timeline.register_entity(Box::new(Counter {
            name: "c1".into(),
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }));
        timeline.init();
        let handle = timeline.schedule(Event::new(20, 0, "c1", EventKind::Init));
        timeline.cancel(handle);
        timeline.run();
        assert_eq!(timeline.now(), 1000);
    }

    #[test]
    fn update_event_time_moves_an_event_without_double_firing() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        timeline.register_entity(Box::new(Counter {
            name: "c1".into(),
            ticks: 0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }));
        timeline.init();
        let handle = timeline.schedule(Event::new(5, 0, "c1", EventKind::Init));
        timeline.update_event_time(handle, Event::new(900, 0, "c1", EventKind::Init));
        timeline.run();
        assert_eq!(timeline.now(), 1000);
    }
}
