//! The `Entity` contract every simulation participant implements.
//!
//! An entity is registered in a [`Timeline`] under a unique name, receives exactly
//! one `init()` call before any event fires, and owns a deterministic PRNG seeded
//! from the topology config so that repeated runs with the same seed set are
//! bit-for-bit reproducible.

use rand_chacha::ChaCha8Rng;

use super::event::EventKind;
use super::timeline::Timeline;

pub trait Entity: Send {
    fn name(&self) -> &str;

    /// Called exactly once, in registration order, before the event loop starts.
    /// Implementations may schedule events here (e.g. the first HELLO timer).
    fn init(&mut self, timeline: &mut Timeline);

    /// Dispatch a fired event addressed to this entity.
    fn handle_event(&mut self, timeline: &mut Timeline, kind: EventKind);

    fn rng_mut(&mut self) -> &mut ChaCha8Rng;
}
