//! Rules: condition/action pairs the resource manager evaluates against
//! every memory whose state changes (§4.3).
//!
//! A rule's `condition` is a plain closure rather than a trait object so
//! application code can build rules inline without defining a new type per
//! rule; `action` is likewise a closure, returning the protocol (if any) it
//! spawned so the manager can track ownership.

use super::memory_info::MemoryInfo;
use super::protocol::ProtocolKind;

pub type Condition = Box<dyn Fn(&MemoryInfo) -> bool + Send>;
pub type Action = Box<dyn FnMut(&MemoryInfo) -> Option<PendingRequest> + Send>;

/// What a rule's `action` hands back when it fires: enough for the resource
/// manager to both claim the memory locally and send a REQUEST to the peer
/// node that should pair up with it (§4.3's `send_request`).
pub struct PendingRequest {
    pub protocol_name: String,
    pub remote_node: String,
    pub protocol_kind: ProtocolKind,
    pub args: serde_json::Value,
}

pub struct Rule {
    pub id: u64,
    pub priority: i32,
    pub protocol_kind: ProtocolKind,
    condition: Condition,
    action: Action,
    /// Memory indices this rule has already claimed, so `expire` can release
    /// exactly the protocols this rule spawned and no others.
    pub claimed: Vec<usize>,
}

impl Rule {
    pub fn new(id: u64, priority: i32, protocol_kind: ProtocolKind, condition: Condition, action: Action) -> Self {
        Self { id, priority, protocol_kind, condition, action, claimed: Vec::new() }
    }

    pub fn matches(&self, info: &MemoryInfo) -> bool {
        (self.condition)(info)
    }

    pub fn fire(&mut self, info: &MemoryInfo) -> Option<PendingRequest> {
        let spawned = (self.action)(info);
        if spawned.is_some() {
            self.claimed.push(info.index);
        }
        spawned
    }
}

/// Per-node table of active rules, evaluated in descending priority order —
/// higher-priority rules (e.g. an application's explicit request) get first
/// claim on a freshly-RAW memory over background rules (e.g. idle
/// entanglement generation).
#[derive(Default)]
pub struct RuleManager {
    rules: Vec<Rule>,
    next_id: u64,
}

impl RuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, priority: i32, protocol_kind: ProtocolKind, condition: Condition, action: Action) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.rules.push(Rule::new(id, priority, protocol_kind, condition, action));
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    pub fn expire(&mut self, id: u64) -> Option<Rule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    /// Returns the highest-priority matching rule for `info`, if any, so the
    /// resource manager only ever fires one rule per memory-state change.
    pub fn first_match_mut(&mut self, info: &MemoryInfo) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.matches(info))
    }

    pub fn get(&self, id: u64) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::memory_info::{MemoryManager, MemoryState};

    #[test]
    fn load_immediately_claims_an_already_raw_memory_on_rescan() {
        let mut memories = MemoryManager::new(1);
        let mut rules = RuleManager::new();
        let rule_id = rules.load(
            1,
            ProtocolKind::Generation,
            Box::new(|info: &MemoryInfo| info.state == MemoryState::Raw),
            Box::new(|info: &MemoryInfo| {
                Some(PendingRequest {
                    protocol_name: format!("gen_{}", info.index),
                    remote_node: "peer".into(),
                    protocol_kind: ProtocolKind::Generation,
                    args: serde_json::Value::Null,
                })
            }),
        );
        let info = memories.get(0).unwrap().clone();
        let request = rules.first_match_mut(&info).unwrap().fire(&info);
        assert!(request.is_some());
        assert_eq!(rules.get(rule_id).unwrap().claimed, vec![0]);
    }
}
