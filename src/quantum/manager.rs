//! The quantum-state arena: a key-addressed table where many keys can point
//! at one shared state object (§3, §9).
//!
//! [`QuantumManagerHandle`] is the seam between a timeline backed by a local
//! [`QuantumManager`] and one backed by a remote server over the wire
//! protocol in [`super::remote`]; both implementations expose the same
//! synchronous interface so entity code never needs to know which it has.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use super::circuit::{run_circuit, Circuit, Gate};
use super::complex::Complex64;
use super::state::{Formalism, KeyList, QuantumStateData, StateKey};
use crate::error::{Result, SimError};

/// Object-safe, synchronous interface implemented by both the local arena and
/// the remote-manager client (§9 Open Questions: unify local/parallel access
/// behind one trait rather than branching on a mode flag throughout protocol
/// code).
pub trait QuantumManagerHandle: Send + Sync {
    fn new_state(&self, keys: &[StateKey]) -> Result<()>;
    fn get(&self, key: StateKey) -> Result<Arc<RwLock<QuantumStateData>>>;
    fn set(&self, keys: &[StateKey], state: QuantumStateData) -> Result<()>;
    fn run(&self, keys: &[StateKey], circuit: &Circuit, rng: &mut ChaCha8Rng) -> Result<Vec<bool>>;
    fn remove(&self, key: StateKey) -> Result<()>;
}

/// In-process arena. One `Arc<RwLock<_>>` per entangled group; every key in
/// that group's `keys()` list resolves to the same object (shared-reference
/// semantics — the defining invariant of the manager, §3).
pub struct QuantumManager {
    formalism: Formalism,
    next_key: std::sync::atomic::AtomicU64,
    states: RwLock<HashMap<StateKey, Arc<RwLock<QuantumStateData>>>>,
}

impl QuantumManager {
    pub fn new(formalism: Formalism) -> Self {
        Self {
            formalism,
            next_key: std::sync::atomic::AtomicU64::new(0),
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn formalism(&self) -> Formalism {
        self.formalism
    }

    /// Allocates a fresh key not yet bound to any state.
    pub fn new_key(&self) -> StateKey {
        self.next_key.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }
}

impl QuantumManagerHandle for QuantumManager {
    fn new_state(&self, keys: &[StateKey]) -> Result<()> {
        let keys: KeyList = keys.iter().copied().collect();
        let state = match self.formalism {
            Formalism::Ket => QuantumStateData::default_ket(keys.clone()),
            Formalism::Density => QuantumStateData::default_density(keys.clone()),
            Formalism::BellDiagonal => {
                if keys.len() != 2 {
                    return Err(SimError::InvalidState(
                        "Bell-diagonal states require exactly two keys".into(),
                    ));
                }
                QuantumStateData::BellDiagonal {
                    keys: [keys[0], keys[1]],
                    components: [1.0, 0.0, 0.0, 0.0],
                }
            }
        };
        let shared = Arc::new(RwLock::new(state));
        let mut table = self.states.write();
        for k in keys.iter() {
            table.insert(*k, shared.clone());
        }
        Ok(())
    }

    fn get(&self, key: StateKey) -> Result<Arc<RwLock<QuantumStateData>>> {
        self.states
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| SimError::UnknownKey(key))
    }

    fn set(&self, keys: &[StateKey], state: QuantumStateData) -> Result<()> {
        let shared = Arc::new(RwLock::new(state));
        let mut table = self.states.write();
        for k in keys {
            table.insert(*k, shared.clone());
        }
        Ok(())
    }

    fn run(&self, keys: &[StateKey], circuit: &Circuit, rng: &mut ChaCha8Rng) -> Result<Vec<bool>> {
        if let Some(max_qubit) = circuit.max_qubit() {
            if max_qubit >= keys.len() {
                return Err(SimError::InvalidState(format!(
                    "circuit references qubit {max_qubit} but only {} keys were supplied to run()",
                    keys.len()
                )));
            }
        }
        if self.formalism == Formalism::BellDiagonal {
            return Err(SimError::InvalidState(
                "run() does not support Bell-diagonal states; purification's analytic variant updates them directly".into(),
            ));
        }

        // Union: every distinct state object any requested key resolves to,
        // in first-occurrence order. A key's whole entangled group always
        // comes along even if only one of its keys was named, since a gate
        // on one half of a pair has to see the full joint state to evolve
        // correctly.
        let mut groups: Vec<Arc<RwLock<QuantumStateData>>> = Vec::new();
        for &key in keys {
            let state = self.get(key)?;
            if !groups.iter().any(|g| Arc::ptr_eq(g, &state)) {
                groups.push(state);
            }
        }

        // Tensor-pad: lay the union out as [requested keys..., any keys
        // pulled in only via closure...], so circuit gate/measurement
        // indices (which address positions in `keys`) land on the qubits
        // the caller meant.
        let mut global_keys: KeyList = keys.iter().copied().collect();
        for group in &groups {
            for &k in group.read().keys() {
                if !global_keys.contains(&k) {
                    global_keys.push(k);
                }
            }
        }
        let position = |key: StateKey| global_keys.iter().position(|&k| k == key).expect("closure key missing from global_keys");

        let mut combined = match self.formalism {
            Formalism::Ket => QuantumStateData::Ket {
                keys: global_keys.clone(),
                amplitudes: combine_ket(&groups, &global_keys, position),
            },
            Formalism::Density => QuantumStateData::Density {
                keys: global_keys.clone(),
                matrix: combine_density(&groups, &global_keys, position),
            },
            Formalism::BellDiagonal => unreachable!("checked above"),
        };

        let outcomes = run_circuit(&mut combined, circuit, rng);

        let shared = Arc::new(RwLock::new(combined));
        let mut table = self.states.write();
        for &k in global_keys.iter() {
            table.insert(k, shared.clone());
        }
        Ok(outcomes)
    }

    fn remove(&self, key: StateKey) -> Result<()> {
        self.states.write().remove(&key);
        Ok(())
    }
}

/// Builds the ket amplitude vector for the tensor product of `groups` over
/// `global_keys`, reading each group's own local bit for a given key via
/// `position` to place it at the right bit in the combined index.
fn combine_ket(
    groups: &[Arc<RwLock<QuantumStateData>>],
    global_keys: &[StateKey],
    position: impl Fn(StateKey) -> usize,
) -> Vec<Complex64> {
    let dim = 1usize << global_keys.len();
    let mut amplitudes = vec![Complex64::ZERO; dim];
    for (global_index, amplitude) in amplitudes.iter_mut().enumerate() {
        let mut value = Complex64::ONE;
        for group in groups {
            let guard = group.read();
            let QuantumStateData::Ket { keys: local_keys, amplitudes: local_amplitudes } = &*guard else {
                unreachable!("manager formalism is Ket but a stored state is not");
            };
            value = value * local_amplitudes[local_index(local_keys, global_index, &position)];
        }
        *amplitude = value;
    }
    amplitudes
}

/// Same idea as [`combine_ket`] but for density matrices: every entry needs
/// a row-bit and a column-bit extracted per group.
fn combine_density(
    groups: &[Arc<RwLock<QuantumStateData>>],
    global_keys: &[StateKey],
    position: impl Fn(StateKey) -> usize,
) -> Vec<Complex64> {
    let dim = 1usize << global_keys.len();
    let mut matrix = vec![Complex64::ZERO; dim * dim];
    for row in 0..dim {
        for col in 0..dim {
            let mut value = Complex64::ONE;
            for group in groups {
                let guard = group.read();
                let QuantumStateData::Density { keys: local_keys, matrix: local_matrix } = &*guard else {
                    unreachable!("manager formalism is Density but a stored state is not");
                };
                let local_dim = 1usize << local_keys.len();
                let local_row = local_index(local_keys, row, &position);
                let local_col = local_index(local_keys, col, &position);
                value = value * local_matrix[local_row * local_dim + local_col];
            }
            matrix[row * dim + col] = value;
        }
    }
    matrix
}

/// Extracts a group's local basis index out of a combined-space index: for
/// each of the group's own keys, in its own bit order, pull the matching bit
/// out of `global_index` at that key's position in the combined ordering.
fn local_index(local_keys: &[StateKey], global_index: usize, position: &impl Fn(StateKey) -> usize) -> usize {
    let mut index = 0usize;
    for (bit, &key) in local_keys.iter().enumerate() {
        let global_bit = (global_index >> position(key)) & 1;
        index |= global_bit << bit;
    }
    index
}

/// Seeds a per-entity RNG from a run-wide master seed plus the entity's name,
/// so reordering entity registration never changes any entity's draw sequence
/// (§8 determinism property).
pub fn derive_entity_rng(master_seed: u64, entity_name: &str) -> ChaCha8Rng {
    let mut hash = master_seed;
    for byte in entity_name.as_bytes() {
        hash = hash.wrapping_mul(1099511628211).wrapping_add(*byte as u64);
    }
    ChaCha8Rng::seed_from_u64(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn shared_keys_resolve_to_same_object() {
        let mgr = QuantumManager::new(Formalism::Ket);
        let k0 = mgr.new_key();
        let k1 = mgr.new_key();
        mgr.new_state(&[k0, k1]).unwrap();
        let a = mgr.get(k0).unwrap();
        let b = mgr.get(k1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn derive_entity_rng_is_deterministic_per_name() {
        let mut r1 = derive_entity_rng(7, "node_a");
        let mut r2 = derive_entity_rng(7, "node_a");
        let draws1: Vec<u32> = (0..5).map(|_| r1.gen()).collect();
        let draws2: Vec<u32> = (0..5).map(|_| r2.gen()).collect();
        assert_eq!(draws1, draws2);

        let mut r3 = derive_entity_rng(7, "node_b");
        let draws3: Vec<u32> = (0..5).map(|_| r3.gen()).collect();
        assert_ne!(draws1, draws3);
    }

    #[test]
    fn run_builds_compound_state_over_independently_entangled_pairs() {
        let mgr = QuantumManager::new(Formalism::Ket);
        let keep = mgr.new_key();
        let keep_remote = mgr.new_key();
        let meas = mgr.new_key();
        let meas_remote = mgr.new_key();

        let mut keep_amplitudes = vec![Complex64::ZERO; 4];
        keep_amplitudes[1] = Complex64::ONE; // keep=1, keep_remote=0
        mgr.set(
            &[keep, keep_remote],
            QuantumStateData::Ket { keys: smallvec![keep, keep_remote], amplitudes: keep_amplitudes },
        )
        .unwrap();

        let mut meas_amplitudes = vec![Complex64::ZERO; 4];
        meas_amplitudes[2] = Complex64::ONE; // meas=0, meas_remote=1
        mgr.set(
            &[meas, meas_remote],
            QuantumStateData::Ket { keys: smallvec![meas, meas_remote], amplitudes: meas_amplitudes },
        )
        .unwrap();

        let mut circuit = Circuit::new();
        circuit.push(Gate::Cnot { control: 0, target: 1 }).measure(1);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let outcomes = mgr.run(&[keep, meas], &circuit, &mut rng).unwrap();
        assert_eq!(outcomes, vec![true]);

        // The two previously-independent pairs are now one joint object
        // covering all four keys, not just the two that were named.
        assert!(Arc::ptr_eq(&mgr.get(keep).unwrap(), &mgr.get(keep_remote).unwrap()));
        assert!(Arc::ptr_eq(&mgr.get(keep).unwrap(), &mgr.get(meas_remote).unwrap()));
    }

    #[test]
    fn run_rejects_a_circuit_that_references_an_unsupplied_qubit() {
        let mgr = QuantumManager::new(Formalism::Ket);
        let k0 = mgr.new_key();
        mgr.new_state(&[k0]).unwrap();
        let mut circuit = Circuit::new();
        circuit.push(Gate::PauliX(1));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = mgr.run(&[k0], &circuit, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::InvalidState(_)));
    }

    #[test]
    fn set_then_get_round_trips_bitwise() {
        let mgr = QuantumManager::new(Formalism::BellDiagonal);
        let k0 = mgr.new_key();
        let k1 = mgr.new_key();
        let components = [0.9, 0.05, 0.03, 0.02];
        mgr.set(&[k0, k1], QuantumStateData::BellDiagonal { keys: [k0, k1], components }).unwrap();
        let state = mgr.get(k0).unwrap();
        match &*state.read() {
            QuantumStateData::BellDiagonal { components: got, .. } => assert_eq!(*got, components),
            _ => panic!("expected Bell-diagonal state"),
        }
    }
}
