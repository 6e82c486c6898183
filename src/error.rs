//! Crate-wide error type (§7 Error Handling Design).
//!
//! Recoverable conditions (an unreachable path, an admission-control
//! rejection, a stale reservation) are returned to the caller as `Err` and
//! logged at `warn`; anything that indicates a broken invariant is logged at
//! `error` and, in the server/parallel-runtime context, triggers the circuit
//! breaker in [`crate::resilience`].

use thiserror::Error;

use crate::quantum::state::StateKey;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown quantum state key: {0}")]
    UnknownKey(StateKey),

    #[error("invalid quantum state: {0}")]
    InvalidState(String),

    #[error("entity not found in timeline: {0}")]
    UnknownEntity(String),

    #[error("no route from {src} to {dst}")]
    NoRoute { src: String, dst: String },

    #[error("memory {0} is not RAW; cannot allocate")]
    MemoryNotAvailable(usize),

    #[error("reservation window [{start}, {end}) overlaps an existing reservation on memory {memory}")]
    ReservationConflict { memory: usize, start: u64, end: u64 },

    #[error("admission control rejected reservation: {0}")]
    AdmissionRejected(String),

    #[error("rule {0} not found")]
    UnknownRule(u64),

    #[error("protocol pairing failed: {0}")]
    PairingFailed(String),

    #[error("topology config error: {0}")]
    Config(String),

    #[error("wire protocol error: {0}")]
    Protocol(String),

    #[error("remote quantum manager I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("circuit breaker open for {0}; rejecting call")]
    CircuitOpen(String),
}
