//! Entanglement swapping at an intermediate node: consumes two entangled
//! pairs sharing this node's memory and produces one longer-range pair
//! (§4.7).
//!
//! `p_swap` and `d_swap` are configurable per protocol instance rather than
//! crate-wide constants, since different middle nodes in a path may run
//! different hardware; the defaults below match the reference model's
//! `success_probability()`/`updated_fidelity()` presets.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::channel::ClassicalChannel;
use crate::error::Result;
use crate::kernel::event::{Event, EventKind};
use crate::kernel::timeline::Timeline;
use crate::resource::memory_info::MemoryUpdate;
use crate::resource::protocol::{Message, MessagePayload, Protocol, ProtocolKind, ProtocolStatus};

pub const DEFAULT_SWAP_SUCCESS_PROBABILITY: f64 = 0.93;
pub const DEFAULT_SWAP_FIDELITY_DISCOUNT: f64 = 0.95;

/// `F_out = d_swap * F_left * F_right` on success (§4.7).
pub fn updated_fidelity(f_left: f64, f_right: f64, d_swap: f64) -> f64 {
    d_swap * f_left * f_right
}

pub struct EntanglementSwapping {
    name: String,
    node: String,
    left_node: String,
    right_node: String,
    left_fidelity: f64,
    right_fidelity: f64,
    /// This node's local memory indices holding the two consumed pairs.
    left_memo_index: usize,
    right_memo_index: usize,
    /// `left_node`'s and `right_node`'s own local memory indices for those
    /// same two pairs, needed to address the `SwapResult` each endpoint gets.
    left_remote_memo_index: usize,
    right_remote_memo_index: usize,
    left_channel: ClassicalChannel,
    right_channel: ClassicalChannel,
    p_swap: f64,
    d_swap: f64,
    status: ProtocolStatus,
    rng: ChaCha8Rng,
}

impl EntanglementSwapping {
    pub fn new(
        name: impl Into<String>,
        node: impl Into<String>,
        left_node: impl Into<String>,
        right_node: impl Into<String>,
        left_fidelity: f64,
        right_fidelity: f64,
        left_memo_index: usize,
        right_memo_index: usize,
        left_remote_memo_index: usize,
        right_remote_memo_index: usize,
        left_channel: ClassicalChannel,
        right_channel: ClassicalChannel,
        p_swap: f64,
        d_swap: f64,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            left_node: left_node.into(),
            right_node: right_node.into(),
            left_fidelity,
            right_fidelity,
            left_memo_index,
            right_memo_index,
            left_remote_memo_index,
            right_remote_memo_index,
            left_channel,
            right_channel,
            p_swap,
            d_swap,
            status: ProtocolStatus::Created,
            rng,
        }
    }

    /// Performs the swap, routing a `SwapResult` to each remote endpoint over
    /// its classical channel and releasing this node's own two memories
    /// either way (§4.7: both source pairs are consumed by a swap attempt,
    /// win or lose).
    pub fn swap(&mut self, timeline: &mut Timeline) -> Result<bool> {
        self.status = ProtocolStatus::Running;
        let success = self.rng.gen::<f64>() < self.p_swap;
        let fidelity = if success { updated_fidelity(self.left_fidelity, self.right_fidelity, self.d_swap) } else { 0.0 };

        let left_message = Message::new(
            ProtocolKind::Swapping,
            self.name.clone(),
            MessagePayload::SwapResult {
                memo_name: self.left_remote_memo_index.to_string(),
                remote_node: self.right_node.clone(),
                remote_memo: self.right_remote_memo_index,
                fidelity,
                success,
            },
        );
        self.left_channel.transmit(timeline, left_message);

        let right_message = Message::new(
            ProtocolKind::Swapping,
            self.name.clone(),
            MessagePayload::SwapResult {
                memo_name: self.right_remote_memo_index.to_string(),
                remote_node: self.left_node.clone(),
                remote_memo: self.left_remote_memo_index,
                fidelity,
                success,
            },
        );
        self.right_channel.transmit(timeline, right_message);

        self.report_outcome(timeline, self.left_memo_index);
        self.report_outcome(timeline, self.right_memo_index);

        self.status = if success { ProtocolStatus::Succeeded } else { ProtocolStatus::Failed };
        Ok(success)
    }

    fn report_outcome(&self, timeline: &mut Timeline, memo_index: usize) {
        timeline.schedule(Event::new(
            timeline.now(),
            0,
            self.node.clone(),
            EventKind::MemoryUpdated { memo_index, update: MemoryUpdate::Raw },
        ));
    }
}

impl Protocol for EntanglementSwapping {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ProtocolStatus {
        self.status
    }

    fn start(&mut self, timeline: &mut Timeline) {
        let _ = self.swap(timeline);
    }

    fn received_message(&mut self, _timeline: &mut Timeline, _src: String, _payload: MessagePayload) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelParameters;
    use crate::kernel::timeline::Timeline;
    use crate::quantum::manager::QuantumManager;
    use crate::quantum::state::Formalism;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn channel(receiver: &str) -> ClassicalChannel {
        ClassicalChannel::new("node_mid", receiver, ChannelParameters { delay: 500, attenuation: 0.0, distance_km: 0.0 })
    }

    #[test]
    fn updated_fidelity_matches_reference_formula() {
        assert!((updated_fidelity(0.9, 0.9, DEFAULT_SWAP_FIDELITY_DISCOUNT) - 0.7695).abs() < 1e-9);
    }

    #[test]
    fn a_successful_swap_routes_results_through_both_channels_and_frees_its_own_memories() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        let mut swap = EntanglementSwapping::new(
            "swap_1",
            "node_mid",
            "node_left",
            "node_right",
            0.9,
            0.9,
            0,
            1,
            3,
            4,
            channel("node_left"),
            channel("node_right"),
            1.0,
            DEFAULT_SWAP_FIDELITY_DISCOUNT,
            ChaCha8Rng::seed_from_u64(0),
        );
        let success = swap.swap(&mut timeline).unwrap();
        assert!(success);
        assert_eq!(swap.status(), ProtocolStatus::Succeeded);
        // Two SwapResult messages plus two MemoryUpdated self-reports.
        assert_eq!(timeline.pending_event_count(), 4);
    }
}
