//! Entanglement-distribution protocols layered on top of the resource
//! manager: generation, purification, swapping (§4.5–§4.7).

pub mod generation;
pub mod purification;
pub mod swapping;

pub use generation::{EntanglementGeneration, GenerationParameters};
pub use purification::BbpsswPurification;
pub use swapping::EntanglementSwapping;
