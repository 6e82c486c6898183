//! Network-layer protocols: routing and end-to-end reservation (§4.8–§4.9).

pub mod reservation;
pub mod routing;

pub use reservation::{admit_along_path, admit_and_install_rules, install_reservation_rules, MemoryTimeCard, Reservation, ResourceReservationProtocol};
pub use routing::{DistributedRoutingProtocol, StaticRoutingTable};
