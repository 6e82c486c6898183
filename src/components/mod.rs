//! Physical/hardware-layer entities: memories, photons, detector midpoints
//! (§4.1 Physical Layer).

pub mod bsm;
pub mod memory;
pub mod photon;

pub use bsm::BsmNode;
pub use memory::Memory;
pub use photon::Photon;
