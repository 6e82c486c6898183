//! Photons: the carriers exchanged over quantum channels (§4.1).

use serde::{Deserialize, Serialize};

use crate::quantum::StateKey;

/// Polarization/time-bin encoding is left to the state formalism; a photon
/// here is just the envelope the channel moves around plus loss bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photon {
    pub name: String,
    /// The quantum-manager key this photon's encoded qubit lives under.
    pub state_key: StateKey,
    /// Wavelength in nanometers, carried through for attenuation/loss models.
    pub wavelength: f64,
    /// Set to `true` by a lossy channel instead of simply dropping the event,
    /// so a receiving detector can distinguish "no photon arrived" (silence)
    /// from "a photon arrived but was lost in transit" when computing dark
    /// counts and click statistics.
    pub is_lost: bool,
}

impl Photon {
    pub fn new(name: impl Into<String>, state_key: StateKey, wavelength: f64) -> Self {
        Self { name: name.into(), state_key, wavelength, is_lost: false }
    }
}
