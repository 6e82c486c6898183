//! Routing: a static next-hop table, and a distributed OSPF-like protocol
//! that builds one from link-state advertisements (§4.8, grounded on
//! `routing_distributed.py`).

use std::collections::{HashMap, HashSet};

use crate::kernel::entity::Entity;
use crate::kernel::event::{Event, EventKind};
use crate::kernel::timeline::Timeline;
use rand_chacha::ChaCha8Rng;

pub const HELLO_INTERVAL: u64 = 1_000_000_000_000; // 1s in picoseconds
pub const DEAD_INTERVAL: u64 = 4 * HELLO_INTERVAL;
pub const MAX_LSA_AGE: u64 = 1000 * HELLO_INTERVAL;

/// Static next-hop table: a pre-computed routing table for topologies that
/// don't need the distributed protocol (§9 Open Questions: static routing is
/// the default; distributed OSPF is opt-in per [`crate::topology`]).
#[derive(Debug, Default, Clone)]
pub struct StaticRoutingTable {
    next_hop: HashMap<String, String>,
}

impl StaticRoutingTable {
    pub fn add_route(&mut self, destination: impl Into<String>, next_hop: impl Into<String>) {
        self.next_hop.insert(destination.into(), next_hop.into());
    }

    pub fn next_hop(&self, destination: &str) -> Option<&str> {
        self.next_hop.get(destination).map(|s| s.as_str())
    }
}

/// Per-neighbor adjacency state machine, named after OSPF's own states. Only
/// the subset relevant to a point-to-point quantum-network link is modeled;
/// broadcast-network election states (DR/BDR) never apply here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Down,
    Init,
    TwoWay,
    ExStart,
    Exchange,
    Loading,
    Full,
}

pub struct NeighborFsm {
    pub neighbor: String,
    pub state: NeighborState,
    pub last_hello_time: u64,
}

impl NeighborFsm {
    pub fn new(neighbor: impl Into<String>) -> Self {
        Self { neighbor: neighbor.into(), state: NeighborState::Down, last_hello_time: 0 }
    }

    pub fn on_hello(&mut self, now: u64) {
        self.last_hello_time = now;
        self.state = match self.state {
            NeighborState::Down => NeighborState::Init,
            NeighborState::Init => NeighborState::TwoWay,
            other => other,
        };
    }

    pub fn advance_to_exstart(&mut self) {
        if self.state == NeighborState::TwoWay {
            self.state = NeighborState::ExStart;
        }
    }

    pub fn advance_to_exchange(&mut self) {
        if self.state == NeighborState::ExStart {
            self.state = NeighborState::Exchange;
        }
    }

    pub fn advance_to_loading(&mut self) {
        if self.state == NeighborState::Exchange {
            self.state = NeighborState::Loading;
        }
    }

    pub fn advance_to_full(&mut self) {
        if matches!(self.state, NeighborState::Loading | NeighborState::Exchange) {
            self.state = NeighborState::Full;
        }
    }

    pub fn check_dead(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_hello_time) > DEAD_INTERVAL && self.state != NeighborState::Down {
            self.state = NeighborState::Down;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lsa {
    pub origin: String,
    pub sequence: u64,
    pub age: u64,
    pub links: Vec<(String, u32)>,
}

/// The link-state database: every node's most recent LSA, keyed by origin.
#[derive(Debug, Default)]
pub struct LinkStateDb {
    lsas: HashMap<String, Lsa>,
}

impl LinkStateDb {
    pub fn install(&mut self, lsa: Lsa) -> bool {
        let newer = match self.lsas.get(&lsa.origin) {
            Some(existing) => lsa.sequence > existing.sequence,
            None => true,
        };
        if newer {
            self.lsas.insert(lsa.origin.clone(), lsa);
        }
        newer
    }

    pub fn expire_aged(&mut self, dt: u64) {
        let mut expired = Vec::new();
        for (origin, lsa) in self.lsas.iter_mut() {
            lsa.age += dt;
            if lsa.age > MAX_LSA_AGE {
                expired.push(origin.clone());
            }
        }
        for origin in expired {
            self.lsas.remove(&origin);
        }
    }

    /// Dijkstra over the link-state database from `source`, producing a
    /// next-hop table. Ties broken by link weight only; equal-cost multipath
    /// is out of scope (§9 Non-goals).
    pub fn compute_routes(&self, source: &str) -> StaticRoutingTable {
        let mut dist: HashMap<String, u32> = HashMap::new();
        let mut next_hop: HashMap<String, String> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        dist.insert(source.to_string(), 0);

        loop {
            let current = dist
                .iter()
                .filter(|(node, _)| !visited.contains(*node))
                .min_by_key(|(_, &cost)| cost)
                .map(|(node, &cost)| (node.clone(), cost));
            let Some((current, current_cost)) = current else { break };
            visited.insert(current.clone());
            let Some(lsa) = self.lsas.get(&current) else { continue };
            for (neighbor, weight) in &lsa.links {
                let candidate = current_cost + weight;
                if candidate < *dist.get(neighbor).unwrap_or(&u32::MAX) {
                    dist.insert(neighbor.clone(), candidate);
                    let hop = if current == source { neighbor.clone() } else { next_hop.get(&current).cloned().unwrap_or_else(|| neighbor.clone()) };
                    next_hop.insert(neighbor.clone(), hop);
                }
            }
        }

        let mut table = StaticRoutingTable::default();
        for (dest, hop) in next_hop {
            table.add_route(dest, hop);
        }
        table
    }
}

/// The distributed routing entity living on each node, driving neighbor FSMs
/// and the link-state database to convergence.
pub struct DistributedRoutingProtocol {
    name: String,
    node: String,
    neighbors: HashMap<String, NeighborFsm>,
    db: LinkStateDb,
    routes: StaticRoutingTable,
    sequence: u64,
    rng: ChaCha8Rng,
}

impl DistributedRoutingProtocol {
    pub fn new(node: impl Into<String>, rng: ChaCha8Rng) -> Self {
        let node = node.into();
        Self {
            name: format!("{node}.routing"),
            node,
            neighbors: HashMap::new(),
            db: LinkStateDb::default(),
            routes: StaticRoutingTable::default(),
            sequence: 0,
            rng,
        }
    }

    pub fn add_neighbor(&mut self, neighbor: impl Into<String>) {
        let neighbor = neighbor.into();
        self.neighbors.insert(neighbor.clone(), NeighborFsm::new(neighbor));
    }

    pub fn next_hop(&self, destination: &str) -> Option<&str> {
        self.routes.next_hop(destination)
    }

    fn recompute(&mut self) {
        self.routes = self.db.compute_routes(&self.node);
    }
}

impl Entity for DistributedRoutingProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, timeline: &mut Timeline) {
        timeline.schedule(Event::new(timeline.now(), 5, self.name.clone(), EventKind::SendHello));
    }

    fn handle_event(&mut self, timeline: &mut Timeline, kind: EventKind) {
        match kind {
            EventKind::SendHello => {
                let links: Vec<(String, u32)> = self.neighbors.keys().map(|n| (n.clone(), 1)).collect();
                self.sequence += 1;
                let lsa = Lsa { origin: self.node.clone(), sequence: self.sequence, age: 0, links };
                if self.db.install(lsa) {
                    self.recompute();
                }
                for (neighbor, fsm) in self.neighbors.iter_mut() {
                    fsm.on_hello(timeline.now());
                    let _ = neighbor;
                }
                timeline.schedule(Event::new(timeline.now() + HELLO_INTERVAL, 5, self.name.clone(), EventKind::SendHello));
            }
            EventKind::RefreshLsa => {
                self.db.expire_aged(0);
                self.recompute();
            }
            EventKind::CheckNeighborLiveness { neighbor, .. } => {
                if let Some(fsm) = self.neighbors.get_mut(&neighbor) {
                    if fsm.check_dead(timeline.now()) {
                        self.recompute();
                    }
                }
            }
            _ => {}
        }
    }

    fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dijkstra_finds_shortest_multi_hop_path() {
        let mut db = LinkStateDb::default();
        db.install(Lsa { origin: "a".into(), sequence: 1, age: 0, links: vec![("b".into(), 1), ("c".into(), 5)] });
        db.install(Lsa { origin: "b".into(), sequence: 1, age: 0, links: vec![("a".into(), 1), ("c".into(), 1)] });
        db.install(Lsa { origin: "c".into(), sequence: 1, age: 0, links: vec![("a".into(), 5), ("b".into(), 1)] });

        let routes = db.compute_routes("a");
        assert_eq!(routes.next_hop("c"), Some("b"));
    }

    #[test]
    fn neighbor_fsm_progresses_through_states() {
        let mut fsm = NeighborFsm::new("b");
        assert_eq!(fsm.state, NeighborState::Down);
        fsm.on_hello(0);
        assert_eq!(fsm.state, NeighborState::Init);
        fsm.on_hello(1);
        assert_eq!(fsm.state, NeighborState::TwoWay);
        fsm.advance_to_exstart();
        fsm.advance_to_exchange();
        fsm.advance_to_loading();
        fsm.advance_to_full();
        assert_eq!(fsm.state, NeighborState::Full);
    }

    #[test]
    fn dead_interval_resets_neighbor_to_down() {
        let mut fsm = NeighborFsm::new("b");
        fsm.on_hello(0);
        assert!(fsm.check_dead(DEAD_INTERVAL + 1));
        assert_eq!(fsm.state, NeighborState::Down);
    }
}
