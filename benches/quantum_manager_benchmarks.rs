//! Quantum-manager arena throughput: allocation, circuit execution and
//! teardown for Bell-pair-sized states.

use criterion::{criterion_group, criterion_main, Criterion};
use quantum_network_sim::quantum::circuit::{run_circuit, Circuit, Gate};
use quantum_network_sim::quantum::manager::{QuantumManager, QuantumManagerHandle};
use quantum_network_sim::quantum::state::{Formalism, QuantumStateData};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use smallvec::smallvec;

fn bench_allocate_and_run(c: &mut Criterion) {
    c.bench_function("allocate_1000_bell_pairs_ket", |b| {
        b.iter(|| {
            let mgr = QuantumManager::new(Formalism::Ket);
            for _ in 0..1000 {
                let k0 = mgr.new_key();
                let k1 = mgr.new_key();
                mgr.new_state(&[k0, k1]).unwrap();
            }
        });
    });

    c.bench_function("run_hadamard_cnot_circuit", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        b.iter(|| {
            let mut state = QuantumStateData::default_ket(smallvec![1u64, 2u64]);
            let mut circuit = Circuit::new();
            circuit.push(Gate::Hadamard(0)).push(Gate::Cnot { control: 0, target: 1 }).measure(0).measure(1);
            run_circuit(&mut state, &circuit, &mut rng);
        });
    });
}

criterion_group!(benches, bench_allocate_and_run);
criterion_main!(benches);
