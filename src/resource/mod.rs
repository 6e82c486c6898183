//! Resource management layer: memory occupancy, rules, and protocol pairing
//! across nodes (§4.3).

pub mod manager;
pub mod memory_info;
pub mod protocol;
pub mod rule;

pub use manager::ResourceManager;
pub use memory_info::{MemoryInfo, MemoryManager, MemoryState, MemoryUpdate};
pub use protocol::{Message, MessagePayload, Protocol, ProtocolKind, ProtocolStatus};
pub use rule::{PendingRequest, Rule, RuleManager};
