//! Quantum state representations: ket vectors, density matrices, and
//! Bell-diagonal states (§3 Data Model).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::complex::Complex64;

/// A handle into the [`QuantumManager`](super::manager::QuantumManager) arena.
/// Allocated from a monotonic counter; never reused within a run.
pub type StateKey = u64;

pub type KeyList = SmallVec<[StateKey; 4]>;

/// Which formalism a timeline's quantum manager was configured for. Mixing
/// formalisms within one manager is a config error (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formalism {
    Ket,
    Density,
    BellDiagonal,
}

/// The shared object multiple keys may point to (§3 QuantumManager invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuantumStateData {
    Ket {
        keys: KeyList,
        amplitudes: Vec<Complex64>,
    },
    Density {
        keys: KeyList,
        /// Row-major `2^n x 2^n` matrix, flattened.
        matrix: Vec<Complex64>,
    },
    BellDiagonal {
        keys: [StateKey; 2],
        /// Diagonal components in the |Φ+>, |Φ->, |Ψ+>, |Ψ-> basis, summing to 1.
        components: [f64; 4],
    },
}

impl QuantumStateData {
    pub fn keys(&self) -> &[StateKey] {
        match self {
            QuantumStateData::Ket { keys, .. } => keys,
            QuantumStateData::Density { keys, .. } => keys,
            QuantumStateData::BellDiagonal { keys, .. } => keys,
        }
    }

    pub fn qubit_count(&self) -> usize {
        self.keys().len()
    }

    /// Fidelity against the nominal target state (Φ+ for Bell pairs, |0..0> for
    /// freshly allocated states). Used for reporting and for the purification
    /// precondition check (§4.6).
    pub fn fidelity_estimate(&self) -> f64 {
        match self {
            QuantumStateData::Ket { amplitudes, .. } => {
                amplitudes.iter().map(|a| a.norm_sqr().powi(2)).sum()
            }
            QuantumStateData::Density { matrix, keys } => {
                let dim = 1usize << keys.len();
                matrix[0 * dim + 0].re
            }
            QuantumStateData::BellDiagonal { components, .. } => components[0],
        }
    }

    pub fn default_ket(keys: KeyList) -> Self {
        let dim = 1usize << keys.len();
        let mut amplitudes = vec![Complex64::ZERO; dim];
        amplitudes[0] = Complex64::ONE;
        QuantumStateData::Ket { keys, amplitudes }
    }

    pub fn default_density(keys: KeyList) -> Self {
        let dim = 1usize << keys.len();
        let mut matrix = vec![Complex64::ZERO; dim * dim];
        matrix[0] = Complex64::ONE;
        QuantumStateData::Density { keys, matrix }
    }
}
