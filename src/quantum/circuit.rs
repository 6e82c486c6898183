//! Quantum circuits applied to ket/density states (§4.2).
//!
//! Bell-diagonal states never go through a `Circuit`; they're updated directly
//! by the purification protocol via analytic formulas (§4.6), so `Gate` only
//! needs to cover what the ket/density formalisms actually exercise: single-
//! and two-qubit Clifford gates plus computational-basis measurement.

use serde::{Deserialize, Serialize};

use super::complex::Complex64;
use super::state::QuantumStateData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    PauliX(usize),
    PauliY(usize),
    PauliZ(usize),
    Hadamard(usize),
    Cnot { control: usize, target: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    pub gates: Vec<Gate>,
    /// Local qubit indices measured at the end of the circuit, in order.
    pub measured: Vec<usize>,
}

impl Gate {
    /// Highest local qubit index this gate touches, used to validate a
    /// circuit against the number of keys it was run with before any state
    /// is mutated.
    pub fn max_qubit(&self) -> usize {
        match *self {
            Gate::PauliX(q) | Gate::PauliY(q) | Gate::PauliZ(q) | Gate::Hadamard(q) => q,
            Gate::Cnot { control, target } => control.max(target),
        }
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest qubit index referenced anywhere in the circuit, across both
    /// gates and measurements.
    pub fn max_qubit(&self) -> Option<usize> {
        let gate_max = self.gates.iter().map(Gate::max_qubit).max();
        let measured_max = self.measured.iter().copied().max();
        gate_max.into_iter().chain(measured_max).max()
    }

    pub fn push(&mut self, gate: Gate) -> &mut Self {
        self.gates.push(gate);
        self
    }

    pub fn measure(&mut self, qubit: usize) -> &mut Self {
        self.measured.push(qubit);
        self
    }
}

/// Applies `circuit` to `state` in place, returning measurement outcomes for
/// every qubit in `circuit.measured`, in order.
///
/// Only the `Ket` and `Density` formalisms are supported; calling this on a
/// `BellDiagonal` state is a logic error the protocol layer must never trigger
/// (§9 Open Questions: BDS bypasses the generic circuit path entirely).
pub fn run_circuit(
    state: &mut QuantumStateData,
    circuit: &Circuit,
    rng: &mut impl rand::Rng,
) -> Vec<bool> {
    match state {
        QuantumStateData::Ket { amplitudes, .. } => {
            for gate in &circuit.gates {
                apply_gate_ket(amplitudes, *gate);
            }
            circuit
                .measured
                .iter()
                .map(|&q| measure_ket(amplitudes, q, rng))
                .collect()
        }
        QuantumStateData::Density { matrix, keys } => {
            let dim = 1usize << keys.len();
            for gate in &circuit.gates {
                apply_gate_density(matrix, dim, *gate);
            }
            circuit
                .measured
                .iter()
                .map(|&q| measure_density(matrix, dim, q, rng))
                .collect()
        }
        QuantumStateData::BellDiagonal { .. } => {
            panic!("run_circuit called on a Bell-diagonal state")
        }
    }
}

fn apply_gate_ket(amplitudes: &mut [Complex64], gate: Gate) {
    match gate {
        Gate::PauliX(q) => for_each_pair(amplitudes, q, |a, b| std::mem::swap(a, b)),
        Gate::PauliY(q) => for_each_pair(amplitudes, q, |a, b| {
            let (old_a, old_b) = (*a, *b);
            *a = Complex64::new(old_b.im, -old_b.re);
            *b = Complex64::new(-old_a.im, old_a.re);
        }),
        Gate::PauliZ(q) => {
            let dim = amplitudes.len();
            for i in 0..dim {
                if (i >> q) & 1 == 1 {
                    amplitudes[i] = amplitudes[i] * (-1.0);
                }
            }
        }
        Gate::Hadamard(q) => {
            let inv_sqrt2 = std::f64::consts::FRAC_1_SQRT_2;
            for_each_pair(amplitudes, q, |a, b| {
                let (old_a, old_b) = (*a, *b);
                *a = (old_a + old_b) * inv_sqrt2;
                *b = (old_a - old_b) * inv_sqrt2;
            });
        }
        Gate::Cnot { control, target } => {
            let dim = amplitudes.len();
            for i in 0..dim {
                if (i >> control) & 1 == 1 && (i >> target) & 1 == 0 {
                    let j = i | (1 << target);
                    amplitudes.swap(i, j);
                }
            }
        }
    }
}

fn for_each_pair(amplitudes: &mut [Complex64], qubit: usize, mut f: impl FnMut(&mut Complex64, &mut Complex64)) {
    let dim = amplitudes.len();
    for i in 0..dim {
        if (i >> qubit) & 1 == 0 {
            let j = i | (1 << qubit);
            let (lo, hi) = amplitudes.split_at_mut(j);
            f(&mut lo[i], &mut hi[0]);
        }
    }
}

fn measure_ket(amplitudes: &mut [Complex64], qubit: usize, rng: &mut impl rand::Rng) -> bool {
    let dim = amplitudes.len();
    let p1: f64 = (0..dim)
        .filter(|i| (i >> qubit) & 1 == 1)
        .map(|i| amplitudes[i].norm_sqr())
        .sum();
    let outcome = rng.gen::<f64>() < p1;
    let norm = if outcome { p1 } else { 1.0 - p1 };
    let norm = norm.sqrt().max(1e-12);
    for i in 0..dim {
        let bit = (i >> qubit) & 1 == 1;
        amplitudes[i] = if bit == outcome {
            amplitudes[i] * (1.0 / norm)
        } else {
            Complex64::ZERO
        };
    }
    outcome
}

fn apply_gate_density(matrix: &mut [Complex64], dim: usize, gate: Gate) {
    // U rho U^dagger via the same bit-pair transform applied to rows then columns.
    let mut u_rows = matrix.to_vec();
    for row in 0..dim {
        let mut row_slice: Vec<Complex64> = (0..dim).map(|c| u_rows[row * dim + c]).collect();
        apply_gate_ket(&mut row_slice, gate);
        for c in 0..dim {
            u_rows[row * dim + c] = row_slice[c];
        }
    }
    for col in 0..dim {
        let mut col_slice: Vec<Complex64> = (0..dim).map(|r| u_rows[r * dim + col]).collect();
        apply_gate_ket(&mut col_slice, gate);
        for r in 0..dim {
            matrix[r * dim + col] = col_slice[r];
        }
    }
}

fn measure_density(matrix: &mut [Complex64], dim: usize, qubit: usize, rng: &mut impl rand::Rng) -> bool {
    let p1: f64 = (0..dim)
        .filter(|i| (i >> qubit) & 1 == 1)
        .map(|i| matrix[i * dim + i].re)
        .sum();
    let outcome = rng.gen::<f64>() < p1;
    let norm = if outcome { p1 } else { 1.0 - p1 };
    let norm = norm.max(1e-12);
    for r in 0..dim {
        for c in 0..dim {
            let r_bit = (r >> qubit) & 1 == 1;
            let c_bit = (c >> qubit) & 1 == 1;
            matrix[r * dim + c] = if r_bit == outcome && c_bit == outcome {
                matrix[r * dim + c] * (1.0 / norm)
            } else {
                Complex64::ZERO
            };
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::state::QuantumStateData;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use smallvec::smallvec;

    #[test]
    fn hadamard_then_measure_is_50_50_over_many_trials() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut ones = 0;
        let trials = 2000;
        for _ in 0..trials {
            let mut state = QuantumStateData::default_ket(smallvec![1u64]);
            let mut circuit = Circuit::new();
            circuit.push(Gate::Hadamard(0)).measure(0);
            let outcome = run_circuit(&mut state, &circuit, &mut rng);
            if outcome[0] {
                ones += 1;
            }
        }
        let frac = ones as f64 / trials as f64;
        assert!((frac - 0.5).abs() < 0.05, "got {frac}");
    }

    #[test]
    fn pauli_x_flips_deterministically() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = QuantumStateData::default_ket(smallvec![1u64]);
        let mut circuit = Circuit::new();
        circuit.push(Gate::PauliX(0)).measure(0);
        let outcome = run_circuit(&mut state, &circuit, &mut rng);
        assert_eq!(outcome, vec![true]);
    }
}
