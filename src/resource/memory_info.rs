//! Per-memory occupancy bookkeeping owned by the resource manager (§4.3).
//!
//! This is deliberately separate from [`crate::components::memory::Memory`]
//! (the hardware entity): `MemoryInfo` tracks *who is allowed to touch this
//! memory right now*, independent of the physical decoherence model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryState {
    /// Unallocated, available to any rule's condition.
    Raw,
    /// Claimed by a running protocol but not yet entangled with a remote memory.
    Occupied,
    /// Holds one half of an entangled pair with a known remote memory.
    Entangled,
}

#[derive(Debug, Clone)]
pub struct MemoryInfo {
    pub index: usize,
    pub state: MemoryState,
    pub remote_node: Option<String>,
    pub remote_memo: Option<usize>,
    pub fidelity: f64,
    pub entangle_time: u64,
    /// Name of the protocol instance currently holding this memory, if any.
    pub owner_protocol: Option<String>,
}

impl MemoryInfo {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: MemoryState::Raw,
            remote_node: None,
            remote_memo: None,
            fidelity: 0.0,
            entangle_time: 0,
            owner_protocol: None,
        }
    }

    pub fn to_raw(&mut self) {
        self.state = MemoryState::Raw;
        self.remote_node = None;
        self.remote_memo = None;
        self.fidelity = 0.0;
        self.owner_protocol = None;
    }

    pub fn to_occupied(&mut self, owner_protocol: impl Into<String>) {
        self.state = MemoryState::Occupied;
        self.owner_protocol = Some(owner_protocol.into());
    }

    pub fn to_entangled(&mut self, remote_node: impl Into<String>, remote_memo: usize, fidelity: f64, entangle_time: u64) {
        self.state = MemoryState::Entangled;
        self.remote_node = Some(remote_node.into());
        self.remote_memo = Some(remote_memo);
        self.fidelity = fidelity;
        self.entangle_time = entangle_time;
    }
}

/// The outcome a protocol reports back to its owning node's resource manager
/// for one of its memories, carried by `EventKind::MemoryUpdated`. Protocols
/// live inside `ResourceManager::protocols` and so can't call back into the
/// manager that owns them directly; reporting through an event instead keeps
/// the same "event as continuation" shape the rest of the kernel uses.
#[derive(Debug, Clone)]
pub enum MemoryUpdate {
    Entangled { remote_node: String, remote_memo: usize, fidelity: f64, entangle_time: u64 },
    Raw,
}

/// The full per-node memory table, indexed by local memory index.
#[derive(Debug, Default)]
pub struct MemoryManager {
    memories: Vec<MemoryInfo>,
}

impl MemoryManager {
    pub fn new(memory_count: usize) -> Self {
        Self { memories: (0..memory_count).map(MemoryInfo::new).collect() }
    }

    pub fn get(&self, index: usize) -> Option<&MemoryInfo> {
        self.memories.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut MemoryInfo> {
        self.memories.get_mut(index)
    }

    pub fn raw_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.memories.iter().filter(|m| m.state == MemoryState::Raw).map(|m| m.index)
    }

    pub fn entangled_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.memories.iter().filter(|m| m.state == MemoryState::Entangled).map(|m| m.index)
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_manager_has_all_raw_memories() {
        let mgr = MemoryManager::new(5);
        assert_eq!(mgr.raw_indices().count(), 5);
        assert_eq!(mgr.entangled_indices().count(), 0);
    }

    #[test]
    fn state_transitions_update_fields_consistently() {
        let mut mgr = MemoryManager::new(1);
        let info = mgr.get_mut(0).unwrap();
        info.to_occupied("gen_proto_1");
        assert_eq!(info.state, MemoryState::Occupied);
        info.to_entangled("node_b", 3, 0.9, 100);
        assert_eq!(info.state, MemoryState::Entangled);
        assert_eq!(info.remote_memo, Some(3));
        info.to_raw();
        assert_eq!(info.state, MemoryState::Raw);
        assert!(info.remote_node.is_none());
    }
}
