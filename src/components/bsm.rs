//! The Bell-state-measurement midpoint station used by entanglement
//! generation (§4.5, grounded in the Barrett-Kok scheme).

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::photon::Photon;
use crate::kernel::entity::Entity;
use crate::kernel::event::EventKind;
use crate::kernel::timeline::Timeline;

#[derive(Debug, Clone, Copy)]
pub struct DetectorParameters {
    pub efficiency: f64,
    pub dark_count_rate: f64,
    /// Resolution window in picoseconds within which two clicks are treated
    /// as simultaneous (a successful BSM event) rather than independent.
    pub coincidence_window: u64,
}

impl Default for DetectorParameters {
    fn default() -> Self {
        Self { efficiency: 0.8, dark_count_rate: 1e4, coincidence_window: 150 }
    }
}

struct PendingClick {
    time: u64,
    detector: usize,
}

/// Midpoint station receiving photons from two memories and reporting
/// BSM outcomes back to both sides' entanglement-generation protocols.
pub struct BsmNode {
    name: String,
    detectors: [DetectorParameters; 2],
    rng: ChaCha8Rng,
    pending: Vec<PendingClick>,
    pub upstream_nodes: [String; 2],
    /// The generation-protocol name waiting on each upstream side, so a
    /// coincidence result is routed to the protocol that owns it rather than
    /// broadcast to every protocol running on that node.
    pub protocol_names: [String; 2],
}

impl BsmNode {
    pub fn new(
        name: impl Into<String>,
        detectors: [DetectorParameters; 2],
        upstream_nodes: [String; 2],
        protocol_names: [String; 2],
        rng: ChaCha8Rng,
    ) -> Self {
        Self { name: name.into(), detectors, rng, pending: Vec::new(), upstream_nodes, protocol_names }
    }

    /// Whether detector `idx` clicks given an (possibly lost) incoming
    /// photon, combining detection efficiency and dark counts the way the
    /// Barrett-Kok reference model does.
    fn detector_clicks(&mut self, idx: usize, photon: &Photon) -> bool {
        let params = self.detectors[idx];
        if !photon.is_lost && self.rng.gen::<f64>() < params.efficiency {
            return true;
        }
        self.rng.gen::<f64>() < params.dark_count_rate * 1e-12
    }

    pub fn receive_photon(&mut self, timeline: &mut Timeline, detector: usize, photon: Photon) {
        let clicked = self.detector_clicks(detector, &photon);
        if !clicked {
            return;
        }
        let now = timeline.now();
        self.pending.retain(|p| now.saturating_sub(p.time) <= self.detectors[detector].coincidence_window);
        if let Some(partner) = self.pending.iter().position(|p| p.detector != detector) {
            self.pending.remove(partner);
            for (node, protocol_name) in self.upstream_nodes.iter().zip(self.protocol_names.iter()) {
                timeline.schedule(crate::kernel::event::Event::new(
                    now,
                    0,
                    node.clone(),
                    EventKind::BsmResult { protocol_name: protocol_name.clone(), detector_outcome: Some(detector == 1) },
                ));
            }
        } else {
            self.pending.push(PendingClick { time: now, detector });
        }
    }
}

impl Entity for BsmNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _timeline: &mut Timeline) {}

    fn handle_event(&mut self, timeline: &mut Timeline, kind: EventKind) {
        if let EventKind::PhotonArrival { photon } = kind {
            let detector = (photon.state_key % 2) as usize;
            self.receive_photon(timeline, detector, photon);
        }
    }

    fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}
