//! Structured logging and the audit trail (§7 ambient stack, adapted from
//! the teacher's `logging` module onto `tracing`).

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogCategory {
    Kernel,
    Quantum,
    Resource,
    Protocol,
    Network,
    Parallel,
}

/// One audited state change worth recording outside the regular tracing
/// stream: reservation admission/rejection, protocol pairing, memory state
/// transitions. Distinct from ordinary `tracing::info!` calls in that these
/// are collected for `tests/` scenario assertions as well as operator
/// review.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub category: LogCategory,
    pub sim_time: u64,
    pub node: String,
    pub message: String,
}

pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wall-clock timer for logging how long a kernel phase (init, a run to
/// completion, a parallel barrier round) actually took, independent of
/// simulated time.
pub struct PerformanceTimer {
    label: &'static str,
    start: Instant,
}

impl PerformanceTimer {
    pub fn start(label: &'static str) -> Self {
        Self { label, start: Instant::now() }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        tracing::debug!(phase = self.label, elapsed_ms = self.start.elapsed().as_millis(), "phase complete");
    }
}

/// In-memory audit log collected during a run, queryable by tests and
/// exposed for operators who want structured post-hoc analysis beyond what
/// the tracing subscriber's sink retains.
#[derive(Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: LogCategory, sim_time: u64, node: impl Into<String>, message: impl Into<String>) {
        let entry = AuditEntry { category, sim_time, node: node.into(), message: message.into() };
        tracing::info!(category = ?entry.category, sim_time, node = %entry.node, "{}", entry.message);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }
}
