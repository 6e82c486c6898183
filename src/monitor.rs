//! Run-time health and Prometheus metrics (§7 ambient stack, adapted from
//! the teacher's `production_monitor` module).

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub enum AlertEvent {
    CircuitBreakerOpen { component: String },
    ReservationBacklog { pending: usize },
    ParallelBarrierStalled { lagging_peer: String },
}

#[derive(Debug, Clone, Copy)]
pub struct MonitoringConfig {
    pub reservation_backlog_threshold: usize,
    pub barrier_stall_threshold_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { reservation_backlog_threshold: 100, barrier_stall_threshold_secs: 5 }
    }
}

static EVENTS_PROCESSED: Lazy<()> = Lazy::new(|| {
    metrics::describe_counter!("sim_events_processed_total", "Discrete events dispatched across all timelines");
    metrics::describe_gauge!("sim_clock_picoseconds", "Current simulated clock value per timeline");
    metrics::describe_histogram!("sim_reservation_admission_latency_ms", "Wall-clock time to admit or reject a reservation");
});

pub fn register_metrics() {
    Lazy::force(&EVENTS_PROCESSED);
}

pub fn record_event_processed() {
    metrics::counter!("sim_events_processed_total").increment(1);
}

pub fn record_clock(timeline_name: &str, now_ps: u64) {
    metrics::gauge!("sim_clock_picoseconds", "timeline" => timeline_name.to_string()).set(now_ps as f64);
}

/// Aggregates health across the running simulation and broadcasts
/// [`AlertEvent`]s to any subscriber (an operator CLI, a test harness)
/// exactly as the teacher's monitor exposes a `broadcast::Receiver`.
pub struct ProductionMonitor {
    config: MonitoringConfig,
    alert_tx: broadcast::Sender<AlertEvent>,
}

impl ProductionMonitor {
    pub fn new(config: MonitoringConfig) -> Self {
        let (alert_tx, _) = broadcast::channel(64);
        Self { config, alert_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.alert_tx.subscribe()
    }

    pub fn check_reservation_backlog(&self, pending: usize) -> HealthStatus {
        if pending > self.config.reservation_backlog_threshold {
            let _ = self.alert_tx.send(AlertEvent::ReservationBacklog { pending });
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn check_barrier_stall(&self, lagging_peer: &str, stalled_secs: u64) -> HealthStatus {
        if stalled_secs > self.config.barrier_stall_threshold_secs {
            let _ = self.alert_tx.send(AlertEvent::ParallelBarrierStalled { lagging_peer: lagging_peer.to_string() });
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn report_circuit_open(&self, component: &str) {
        let _ = self.alert_tx.send(AlertEvent::CircuitBreakerOpen { component: component.to_string() });
    }
}
