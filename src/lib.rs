//! Discrete-event simulator for quantum networks: entanglement generation,
//! purification, swapping, routing and reservation over a deterministic
//! kernel (§1 Purpose & Scope).
//!
//! The crate is organized top-down the way a run is assembled: [`topology`]
//! loads a [`TopologyConfig`](topology::TopologyConfig) describing nodes and
//! channels; [`kernel`] provides the event loop every node runs on;
//! [`quantum`] is the state arena nodes and protocols share; [`components`],
//! [`resource`], [`protocols`] and [`network`] build the physical and
//! protocol layers on top of it; [`node`] is the `Entity` that registers a
//! host in the timeline and routes events into its resource manager;
//! [`parallel`] lets several [`kernel::Timeline`]s run cooperatively when a
//! topology is partitioned across processes.

pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod channel;
pub mod components;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod monitor;
pub mod network;
pub mod node;
pub mod parallel;
pub mod protocols;
pub mod quantum;
pub mod resilience;
pub mod resource;
pub mod topology;

pub use error::{Result, SimError};
pub use kernel::{Entity, Event, EventKind, Timeline};
