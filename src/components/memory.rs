//! Physical quantum memory: the [`Entity`] that emits photons and decoheres
//! over time (§4.1). Occupancy/ownership bookkeeping (RAW/OCCUPIED/ENTANGLED)
//! lives one layer up in [`crate::resource::memory_info`]; this module only
//! models the hardware.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::photon::Photon;
use crate::kernel::entity::Entity;
use crate::kernel::event::EventKind;
use crate::kernel::timeline::Timeline;
use crate::quantum::StateKey;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryParameters {
    /// T2 coherence time in picoseconds.
    pub coherence_time: u64,
    pub frequency: f64,
    /// Probability a photon emission attempt actually produces a photon.
    pub efficiency: f64,
    pub wavelength: f64,
}

impl Default for MemoryParameters {
    fn default() -> Self {
        Self {
            coherence_time: 1_300_000_000_000, // 1300s, SeQUeNCe's default
            frequency: 2000.0,
            efficiency: 1.0,
            wavelength: 500.0,
        }
    }
}

pub struct Memory {
    name: String,
    owner: String,
    params: MemoryParameters,
    pub state_key: StateKey,
    rng: ChaCha8Rng,
    last_reset_time: u64,
}

impl Memory {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, params: MemoryParameters, state_key: StateKey, rng: ChaCha8Rng) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            params,
            state_key,
            rng,
            last_reset_time: 0,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn params(&self) -> &MemoryParameters {
        &self.params
    }

    /// Fidelity decay since the last reset, an exponential model in the
    /// elapsed time over the coherence time (matches the original's
    /// `exp(-t / coherence_time)` decoherence curve).
    pub fn decohered_fidelity(&self, now: u64, base_fidelity: f64) -> f64 {
        let elapsed = now.saturating_sub(self.last_reset_time) as f64;
        let decay = (-elapsed / self.params.coherence_time as f64).exp();
        0.25 + (base_fidelity - 0.25) * decay
    }

    pub fn reset(&mut self, now: u64) {
        self.last_reset_time = now;
    }

    /// Whether an emission attempt at this instant produces a photon,
    /// drawing from the memory's own PRNG so repeated runs reproduce the same
    /// sequence of successes/failures.
    pub fn attempt_emission(&mut self) -> bool {
        self.rng.gen::<f64>() < self.params.efficiency
    }

    pub fn emit_photon(&mut self, photon_name: impl Into<String>) -> Photon {
        Photon::new(photon_name, self.state_key, self.params.wavelength)
    }
}

impl Entity for Memory {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _timeline: &mut Timeline) {}

    fn handle_event(&mut self, _timeline: &mut Timeline, kind: EventKind) {
        if let EventKind::MemoryExpire { .. } = kind {
            // Expiry is driven by the owning resource manager via memory_info;
            // the memory entity itself only tracks the decoherence clock.
        }
    }

    fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}
