//! Classical and quantum channels: fixed point-to-point links with a
//! propagation delay and, for quantum channels, a loss/attenuation model
//! (§4.1).

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::components::photon::Photon;
use crate::kernel::event::{Event, EventKind};
use crate::kernel::timeline::Timeline;
use crate::resource::protocol::Message;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelParameters {
    /// One-way propagation delay in picoseconds.
    pub delay: u64,
    /// Attenuation in dB/km; ignored by classical channels.
    pub attenuation: f64,
    pub distance_km: f64,
}

pub struct ClassicalChannel {
    pub sender: String,
    pub receiver: String,
    pub params: ChannelParameters,
}

impl ClassicalChannel {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, params: ChannelParameters) -> Self {
        Self { sender: sender.into(), receiver: receiver.into(), params }
    }

    pub fn transmit(&self, timeline: &mut Timeline, message: Message) {
        let arrival = timeline.now() + self.params.delay;
        timeline.schedule(Event::new(
            arrival,
            0,
            self.receiver.clone(),
            EventKind::MessageArrival { src: self.sender.clone(), message },
        ));
    }
}

pub struct QuantumChannel {
    pub sender: String,
    pub receiver: String,
    pub params: ChannelParameters,
}

impl QuantumChannel {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, params: ChannelParameters) -> Self {
        Self { sender: sender.into(), receiver: receiver.into(), params }
    }

    /// Total transmittance from attenuation alone: `10^(-attenuation * km / 10)`,
    /// the standard fiber-loss formula used throughout the optical-network
    /// literature this simulator's channel model is grounded on.
    pub fn transmittance(&self) -> f64 {
        10f64.powf(-self.params.attenuation * self.params.distance_km / 10.0)
    }

    pub fn transmit(&self, timeline: &mut Timeline, mut photon: Photon, rng: &mut ChaCha8Rng) {
        if rng.gen::<f64>() > self.transmittance() {
            photon.is_lost = true;
        }
        let arrival = timeline.now() + self.params.delay;
        timeline.schedule(Event::new(arrival, 0, self.receiver.clone(), EventKind::PhotonArrival { photon }));
    }
}
