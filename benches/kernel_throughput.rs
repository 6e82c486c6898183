//! Throughput of the bare event loop: how many scheduled/dispatched events
//! per second with no quantum or protocol work attached.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use quantum_network_sim::kernel::entity::Entity;
use quantum_network_sim::kernel::event::{Event, EventKind};
use quantum_network_sim::kernel::timeline::Timeline;
use quantum_network_sim::quantum::manager::QuantumManager;
use quantum_network_sim::quantum::state::Formalism;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

struct Ticker {
    name: String,
    remaining: u32,
    rng: ChaCha8Rng,
}

impl Entity for Ticker {
    fn name(&self) -> &str {
        &self.name
    }
    fn init(&mut self, timeline: &mut Timeline) {
        timeline.schedule(Event::new(1, 0, self.name.clone(), EventKind::Init));
    }
    fn handle_event(&mut self, timeline: &mut Timeline, _kind: EventKind) {
        self.remaining -= 1;
        if self.remaining > 0 {
            let next = timeline.now() + 1;
            timeline.schedule(Event::new(next, 0, self.name.clone(), EventKind::Init));
        }
    }
    fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

fn bench_event_loop(c: &mut Criterion) {
    c.bench_function("10k_sequential_events", |b| {
        b.iter(|| {
            let qm = Arc::new(QuantumManager::new(Formalism::Ket));
            let mut timeline = Timeline::new(20_000, qm);
            timeline.register_entity(Box::new(Ticker { name: "ticker".into(), remaining: 10_000, rng: ChaCha8Rng::seed_from_u64(0) }));
            timeline.run();
        });
    });
}

criterion_group!(benches, bench_event_loop);
criterion_main!(benches);
