//! The node entity: the `Entity` every named host in a topology registers as,
//! owning a [`ResourceManager`] and routing classical messages, BSM results
//! and protocol outcomes into it (§4.1, §4.3).
//!
//! Protocols (generation, purification, swapping) live inside the resource
//! manager's protocol table, not the timeline's entity registry — they
//! report outcomes back up to this entity via `EventKind::MemoryUpdated`
//! rather than holding a reference to it directly.

use rand_chacha::ChaCha8Rng;

use crate::kernel::entity::Entity;
use crate::kernel::event::EventKind;
use crate::kernel::timeline::Timeline;
use crate::resource::manager::ResourceManager;

pub struct Node {
    name: String,
    pub resource_manager: ResourceManager,
    rng: ChaCha8Rng,
}

impl Node {
    pub fn new(name: impl Into<String>, memory_count: usize, rng: ChaCha8Rng) -> Self {
        let name = name.into();
        let resource_manager = ResourceManager::new(name.clone(), memory_count);
        Self { name, resource_manager, rng }
    }
}

impl Entity for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _timeline: &mut Timeline) {}

    fn handle_event(&mut self, timeline: &mut Timeline, kind: EventKind) {
        match kind {
            EventKind::MessageArrival { src, message } => {
                self.resource_manager.received_message(timeline, src, message);
            }
            EventKind::MemoryUpdated { memo_index, update } => {
                self.resource_manager.update(timeline, memo_index, Some(update));
            }
            EventKind::MemoryExpire { memo_index } => {
                if let Err(err) = self.resource_manager.memory_expire(timeline, memo_index) {
                    tracing::warn!(node = %self.name, memo_index, %err, "memory_expire failed");
                }
            }
            EventKind::RuleExpire { rule_id } => {
                self.resource_manager.expire_rule(timeline, rule_id);
            }
            EventKind::BsmResult { protocol_name, detector_outcome } => {
                self.resource_manager.deliver_bsm_result(timeline, &protocol_name, detector_outcome);
            }
            _ => {}
        }
    }

    fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::manager::QuantumManager;
    use crate::quantum::state::Formalism;
    use crate::resource::memory_info::{MemoryState, MemoryUpdate};
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn memory_updated_event_mutates_the_owning_nodes_memory_table() {
        let qm = Arc::new(QuantumManager::new(Formalism::Ket));
        let mut timeline = Timeline::new(1000, qm);
        let mut node = Node::new("node_a", 1, ChaCha8Rng::seed_from_u64(0));
        node.handle_event(
            &mut timeline,
            EventKind::MemoryUpdated {
                memo_index: 0,
                update: MemoryUpdate::Entangled { remote_node: "node_b".into(), remote_memo: 0, fidelity: 0.9, entangle_time: 10 },
            },
        );
        let info = node.resource_manager.memories.get(0).unwrap();
        assert_eq!(info.state, MemoryState::Entangled);
        assert_eq!(info.remote_memo, Some(0));
    }
}
