//! The classical message envelope exchanged between protocol instances, and
//! the `Protocol` lifecycle contract shared by entanglement generation,
//! purification, swapping and reservation (§4.3, §4.9).

use serde::{Deserialize, Serialize};

use crate::kernel::entity::Entity;
use crate::kernel::timeline::Timeline;

/// Which protocol family a message belongs to; the receiving resource
/// manager dispatches on this before handing the payload to the matching
/// protocol instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    Generation,
    Purification,
    Swapping,
    Routing,
    Reservation,
    ResourceManagement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: ProtocolKind,
    pub receiver_protocol: String,
    pub payload: MessagePayload,
}

impl Message {
    pub fn new(kind: ProtocolKind, receiver_protocol: impl Into<String>, payload: MessagePayload) -> Self {
        Self { kind, receiver_protocol: receiver_protocol.into(), payload }
    }
}

/// The union of every payload shape a protocol in this crate sends. Kept as
/// one enum (rather than per-protocol trait objects) so `Message` can cross
/// the classical channel / resource-manager boundary without dynamic
/// dispatch, matching the event system's closed-enum design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    GenerationNegotiate { memo_name: String, qc_delay: u64 },
    GenerationAck,
    PurificationStart { kept_memo: String, meas_memo: String, fidelity: f64 },
    PurificationResult { success: bool, meas_outcome: Option<(bool, bool)> },
    SwapRequest { memo_name: String, fidelity: f64, is_success: bool },
    /// Delivered to each endpoint of a swap by the middle node, telling it
    /// which memory to update and who its new long-range partner is. Handled
    /// directly by the resource manager (like `ReleaseMemory`), not routed to
    /// a named protocol instance — the endpoint has no swapping protocol of
    /// its own.
    SwapResult { memo_name: String, remote_node: String, remote_memo: usize, fidelity: f64, success: bool },
    ResourceRequest { protocol_kind: ProtocolKind, args: serde_json::Value },
    ResourceResponse { accepted: bool, protocol_name: Option<String> },
    ReleaseProtocol { protocol_name: String },
    ReleaseMemory { memo_name: String },
    RoutingHello { node: String, sequence: u64 },
    RoutingDbd { summaries: Vec<String> },
    RoutingLsr { requested: Vec<String> },
    RoutingLsu { lsas: Vec<String> },
    RoutingLsAck { acked: Vec<String> },
    ReservationRequest { reservation_id: u64, path: Vec<String>, start: u64, end: u64, memory_size: usize, target_fidelity: f64 },
    ReservationReject { reservation_id: u64, reason: String },
    ReservationAccept { reservation_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

/// Contract shared by every protocol instance attached to a node. Distinct
/// from [`Entity`]: a protocol does not sit directly in the timeline's
/// registry, it is driven by its owning node/resource manager, which *is*
/// the `Entity`.
pub trait Protocol: Send {
    fn name(&self) -> &str;
    fn status(&self) -> ProtocolStatus;
    fn start(&mut self, timeline: &mut Timeline);
    fn received_message(&mut self, timeline: &mut Timeline, src: String, payload: MessagePayload);

    /// Delivered only to entanglement-generation protocols, when the BSM
    /// they're waiting on resolves a detector coincidence (or silence).
    /// Every other protocol kind is indifferent to BSM results, hence the
    /// no-op default rather than a separate trait.
    fn handle_bsm_result(&mut self, _timeline: &mut Timeline, _outcome: Option<bool>) {}
}

/// Marker bound used by node entities that host protocol instances, so
/// generic resource-management code can require "an Entity that is also a
/// protocol host" without knowing the concrete node type.
pub trait ProtocolHost: Entity {
    fn protocol_kinds(&self) -> &[ProtocolKind];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_json() {
        let message = Message::new(
            ProtocolKind::Reservation,
            "rsvp_1",
            MessagePayload::ReservationRequest {
                reservation_id: 42,
                path: vec!["a".into(), "b".into(), "c".into()],
                start: 0,
                end: 1_000_000_000_000,
                memory_size: 10,
                target_fidelity: 0.9,
            },
        );
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.receiver_protocol, message.receiver_protocol);
        match (decoded.payload, message.payload) {
            (
                MessagePayload::ReservationRequest { reservation_id: a, .. },
                MessagePayload::ReservationRequest { reservation_id: b, .. },
            ) => assert_eq!(a, b),
            _ => panic!("payload variant changed across round trip"),
        }
    }
}
