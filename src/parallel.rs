//! Conservative parallel synchronization: each timeline owns a disjoint
//! subset of nodes; a barrier exchanges per-peer lookahead values every round
//! so no timeline ever processes an event before it's safe to (§5
//! Concurrency & Resource Model, §9).

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};

use crate::kernel::timeline::Timeline;

/// One peer's contribution to a synchronization round: the earliest time it
/// might still send a cross-timeline message, or `None` if it has no more
/// pending work this run.
#[derive(Debug, Clone, Copy)]
pub struct LookaheadReport {
    pub peer: usize,
    pub earliest_next_event: Option<u64>,
}

/// Exchanges [`LookaheadReport`]s among `peer_count` timelines and computes
/// the global minimum, the time every timeline may safely advance to without
/// risking a causality violation (the conservative synchronization
/// algorithm's defining guarantee).
pub struct Barrier {
    peer_count: usize,
    reports: Mutex<HashMap<usize, Option<u64>>>,
    round_tx: mpsc::UnboundedSender<u64>,
    round_rx: Mutex<mpsc::UnboundedReceiver<u64>>,
}

impl Barrier {
    pub fn new(peer_count: usize) -> Self {
        let (round_tx, round_rx) = mpsc::unbounded_channel();
        Self { peer_count, reports: Mutex::new(HashMap::new()), round_tx, round_rx: Mutex::new(round_rx) }
    }

    /// Submits this peer's lookahead and blocks until every peer in the
    /// round has submitted theirs, then returns the global minimum (or
    /// `None` if every peer has run dry).
    pub async fn sync_round(&self, peer: usize, earliest_next_event: Option<u64>) -> Option<u64> {
        let mut reports = self.reports.lock().await;
        reports.insert(peer, earliest_next_event);
        if reports.len() < self.peer_count {
            drop(reports);
            let mut rx = self.round_rx.lock().await;
            return rx.recv().await;
        }

        let global_min = reports.values().copied().flatten().min();
        reports.clear();
        if let Some(min) = global_min {
            for _ in 1..self.peer_count {
                let _ = self.round_tx.send(min);
            }
        }
        global_min
    }
}

/// Drives one timeline through repeated barrier rounds until it and every
/// peer have no more events, the top-level loop a parallel-mode run uses in
/// place of a single timeline's `run()`.
pub async fn run_timeline_with_barrier(timeline: &mut Timeline, peer: usize, barrier: &Barrier) {
    loop {
        let lookahead = timeline.peek_next_time();
        let Some(window_end) = barrier.sync_round(peer, lookahead).await else {
            break;
        };
        if lookahead.is_none() {
            continue;
        }
        timeline.run_until(window_end);
        if timeline.peek_next_time().is_none() && lookahead.unwrap() > window_end {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn barrier_computes_global_minimum_across_peers() {
        let barrier = Arc::new(Barrier::new(2));
        let b1 = barrier.clone();
        let b2 = barrier.clone();
        let t1 = tokio::spawn(async move { b1.sync_round(0, Some(100)).await });
        let t2 = tokio::spawn(async move { b2.sync_round(1, Some(50)).await });
        let (r1, r2) = tokio::join!(t1, t2);
        assert_eq!(r1.unwrap(), Some(50));
        assert_eq!(r2.unwrap(), Some(50));
    }
}
