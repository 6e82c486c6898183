//! Per-node resource manager: owns the memory table and rule set, pairs
//! protocols across nodes via REQUEST/RESPONSE/RELEASE messages (§4.3,
//! grounded on the original's `resource_manager.py`).

use std::collections::HashMap;

use crate::channel::{ChannelParameters, ClassicalChannel};
use crate::error::{Result, SimError};
use crate::kernel::timeline::Timeline;

use super::memory_info::{MemoryManager, MemoryState, MemoryUpdate};
use super::protocol::{Message, MessagePayload, Protocol, ProtocolKind, ProtocolStatus};
use super::rule::{Action, Condition, PendingRequest, RuleManager};

pub struct ResourceManager {
    pub node_name: String,
    pub memories: MemoryManager,
    pub rules: RuleManager,
    protocols: HashMap<String, Box<dyn Protocol>>,
    channels: HashMap<String, ClassicalChannel>,
    /// REQUESTs this node sent, waiting on a RESPONSE from the remote peer.
    pending_protocols: HashMap<String, PendingRequest>,
    /// REQUESTs this node accepted from a remote peer, waiting for a
    /// matching local protocol instance to be registered.
    waiting_protocols: HashMap<String, (String, ProtocolKind)>,
}

impl ResourceManager {
    pub fn new(node_name: impl Into<String>, memory_count: usize) -> Self {
        Self {
            node_name: node_name.into(),
            memories: MemoryManager::new(memory_count),
            rules: RuleManager::new(),
            protocols: HashMap::new(),
            channels: HashMap::new(),
            pending_protocols: HashMap::new(),
            waiting_protocols: HashMap::new(),
        }
    }

    /// Registers the classical channel used to reach `remote_node`; REQUEST,
    /// RESPONSE and RELEASE messages this manager originates all go out
    /// through whichever channel matches their destination.
    pub fn connect(&mut self, remote_node: impl Into<String>, params: ChannelParameters) {
        let remote_node = remote_node.into();
        let channel = ClassicalChannel::new(self.node_name.clone(), remote_node.clone(), params);
        self.channels.insert(remote_node, channel);
    }

    /// Called whenever a memory's state changes (entangled, expired,
    /// released): applies `applied` (if this call is reporting a protocol's
    /// outcome) directly to the memory table, then re-evaluates rules
    /// against the updated memory and fires the first match, mirroring
    /// `ResourceManager.update` in the original.
    pub fn update(&mut self, timeline: &mut Timeline, memo_index: usize, applied: Option<MemoryUpdate>) {
        if let Some(update) = applied {
            let Some(info) = self.memories.get_mut(memo_index) else { return };
            match update {
                MemoryUpdate::Entangled { remote_node, remote_memo, fidelity, entangle_time } => {
                    info.to_entangled(remote_node, remote_memo, fidelity, entangle_time);
                }
                MemoryUpdate::Raw => {
                    let owner = info.owner_protocol.take();
                    info.to_raw();
                    if let Some(owner) = owner {
                        self.protocols.remove(&owner);
                    }
                }
            }
        }
        let Some(info) = self.memories.get(memo_index).cloned() else { return };
        let request = self.rules.first_match_mut(&info).and_then(|rule| rule.fire(&info));
        if let Some(request) = request {
            if let Some(info) = self.memories.get_mut(memo_index) {
                info.to_occupied(request.protocol_name.clone());
            }
            self.send_request(timeline, request);
        }
    }

    /// Installs a rule and immediately re-scans the memory table, so a rule
    /// installed after a memory is already idle (e.g. a reservation landing
    /// on an already-RAW memory) doesn't have to wait for an unrelated state
    /// change before it can fire (§4.3's `load`).
    pub fn load_rule(&mut self, timeline: &mut Timeline, priority: i32, protocol_kind: ProtocolKind, condition: Condition, action: Action) -> u64 {
        let rule_id = self.rules.load(priority, protocol_kind, condition, action);
        for index in 0..self.memories.len() {
            self.update(timeline, index, None);
        }
        rule_id
    }

    /// Releases every protocol a rule spawned and returns their memories to
    /// RAW (§4.3's `expire`).
    pub fn expire_rule(&mut self, timeline: &mut Timeline, rule_id: u64) {
        let Some(rule) = self.rules.expire(rule_id) else { return };
        for memo_index in rule.claimed {
            self.update(timeline, memo_index, Some(MemoryUpdate::Raw));
        }
    }

    /// Sends a REQUEST for `request.protocol_name` to `request.remote_node`,
    /// recording it as pending until a RESPONSE arrives (§4.3, §4.4).
    fn send_request(&mut self, timeline: &mut Timeline, request: PendingRequest) {
        let message = Message::new(
            request.protocol_kind,
            request.protocol_name.clone(),
            MessagePayload::ResourceRequest { protocol_kind: request.protocol_kind, args: request.args.clone() },
        );
        match self.channels.get(&request.remote_node) {
            Some(channel) => channel.transmit(timeline, message),
            None => tracing::warn!(
                node = %self.node_name,
                remote = %request.remote_node,
                "no classical channel registered to remote node; dropping resource request"
            ),
        }
        tracing::debug!(
            node = %self.node_name,
            protocol = %request.protocol_name,
            remote = %request.remote_node,
            kind = ?request.protocol_kind,
            "resource manager requested protocol pairing"
        );
        self.pending_protocols.insert(request.protocol_name.clone(), request);
    }

    /// Whether a REQUEST for `protocol_name` can be accepted: this node must
    /// not already have sent a REQUEST under the same name, nor already be
    /// waiting to pair a different remote REQUEST under it (§4.4's
    /// `req_condition_fn`).
    fn req_condition(&self, protocol_name: &str) -> bool {
        !self.pending_protocols.contains_key(protocol_name) && !self.waiting_protocols.contains_key(protocol_name)
    }

    pub fn register_protocol(&mut self, protocol: Box<dyn Protocol>) {
        self.protocols.insert(protocol.name().to_string(), protocol);
    }

    /// Dispatches an incoming classical message either to resource-management
    /// bookkeeping (REQUEST/RESPONSE/RELEASE) or straight through to the
    /// named protocol instance.
    pub fn received_message(&mut self, timeline: &mut Timeline, src: String, message: Message) {
        match message.payload {
            MessagePayload::ResourceRequest { protocol_kind, args } => {
                let accept = self.req_condition(&message.receiver_protocol);
                if accept {
                    self.waiting_protocols.insert(message.receiver_protocol.clone(), (src.clone(), protocol_kind));
                }
                tracing::debug!(node = %self.node_name, from = %src, ?protocol_kind, accept, "resource request received");
                let response = Message::new(
                    protocol_kind,
                    message.receiver_protocol.clone(),
                    MessagePayload::ResourceResponse {
                        accepted: accept,
                        protocol_name: accept.then(|| message.receiver_protocol.clone()),
                    },
                );
                if let Some(channel) = self.channels.get(&src) {
                    channel.transmit(timeline, response);
                }
                let _ = args;
            }
            MessagePayload::ResourceResponse { accepted, protocol_name } => {
                if let Some(name) = &protocol_name {
                    self.pending_protocols.remove(name);
                    if accepted {
                        if let Some(protocol) = self.protocols.get_mut(name) {
                            protocol.start(timeline);
                        }
                    }
                }
            }
            MessagePayload::ReleaseProtocol { protocol_name } => {
                self.release_remote_protocol(&protocol_name);
            }
            MessagePayload::ReleaseMemory { memo_name } => {
                if let Ok(index) = memo_name.parse::<usize>() {
                    self.release_remote_memory(index);
                }
            }
            MessagePayload::SwapResult { memo_name, remote_node, remote_memo, fidelity, success } => {
                if let Ok(index) = memo_name.parse::<usize>() {
                    let update = if success {
                        MemoryUpdate::Entangled { remote_node, remote_memo, fidelity, entangle_time: timeline.now() }
                    } else {
                        MemoryUpdate::Raw
                    };
                    self.update(timeline, index, Some(update));
                }
            }
            payload => {
                if let Some(protocol) = self.protocols.get_mut(&message.receiver_protocol) {
                    protocol.received_message(timeline, src, payload);
                }
            }
        }
    }

    /// Routes a BSM coincidence/silence result to the generation protocol it
    /// belongs to, named in the event the BSM scheduled.
    pub fn deliver_bsm_result(&mut self, timeline: &mut Timeline, protocol_name: &str, outcome: Option<bool>) {
        if let Some(protocol) = self.protocols.get_mut(protocol_name) {
            protocol.handle_bsm_result(timeline, outcome);
        }
    }

    /// A memory's reservation/decoherence window elapsed; return it to RAW
    /// and notify the owning protocol (if any) that it must abandon this
    /// memory, matching `memory_expire` in the original.
    pub fn memory_expire(&mut self, timeline: &mut Timeline, memo_index: usize) -> Result<()> {
        if self.memories.get(memo_index).is_none() {
            return Err(SimError::MemoryNotAvailable(memo_index));
        }
        self.update(timeline, memo_index, Some(MemoryUpdate::Raw));
        Ok(())
    }

    pub fn release_remote_protocol(&mut self, protocol_name: &str) {
        self.protocols.remove(protocol_name);
        self.pending_protocols.remove(protocol_name);
        self.waiting_protocols.remove(protocol_name);
    }

    pub fn release_remote_memory(&mut self, memo_index: usize) {
        if let Some(info) = self.memories.get_mut(memo_index) {
            info.to_raw();
        }
    }

    pub fn protocol_status(&self, name: &str) -> Option<ProtocolStatus> {
        self.protocols.get(name).map(|p| p.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_an_occupied_memory_returns_it_to_raw() {
        let mut rm = ResourceManager::new("node_a", 2);
        rm.memories.get_mut(0).unwrap().to_occupied("proto_1");
        let qm = std::sync::Arc::new(crate::quantum::manager::QuantumManager::new(crate::quantum::state::Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        rm.memory_expire(&mut timeline, 0).unwrap();
        assert_eq!(rm.memories.get(0).unwrap().state, MemoryState::Raw);
    }

    #[test]
    fn update_applies_entangled_outcome_in_place() {
        let mut rm = ResourceManager::new("node_a", 1);
        rm.memories.get_mut(0).unwrap().to_occupied("gen_1");
        let qm = std::sync::Arc::new(crate::quantum::manager::QuantumManager::new(crate::quantum::state::Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        rm.update(
            &mut timeline,
            0,
            Some(MemoryUpdate::Entangled { remote_node: "node_b".into(), remote_memo: 3, fidelity: 0.9, entangle_time: 10 }),
        );
        let info = rm.memories.get(0).unwrap();
        assert_eq!(info.state, MemoryState::Entangled);
        assert_eq!(info.remote_memo, Some(3));
        assert!((info.fidelity - 0.9).abs() < 1e-9);
    }

    #[test]
    fn a_second_request_under_the_same_name_is_rejected() {
        let mut rm = ResourceManager::new("node_a", 1);
        rm.waiting_protocols.insert("gen_1".into(), ("node_b".into(), ProtocolKind::Generation));
        assert!(!rm.req_condition("gen_1"));
        assert!(rm.req_condition("gen_2"));
    }
}
