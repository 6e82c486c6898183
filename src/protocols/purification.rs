//! BBPSSW entanglement purification: a circuit-based variant for ket/density
//! states and a closed-form analytic variant for Bell-diagonal states (§4.6,
//! grounded on `bbpssw_bds.py`).

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, SimError};
use crate::kernel::event::{Event, EventKind};
use crate::kernel::timeline::Timeline;
use crate::quantum::circuit::{Circuit, Gate};
use crate::quantum::{Formalism, QuantumManagerHandle, QuantumStateData, StateKey};
use crate::resource::memory_info::MemoryUpdate;
use crate::resource::protocol::{MessagePayload, Protocol, ProtocolStatus};

/// Two noisy pairs (kept, meas) go in; one pair at `keep_key` survives with
/// improved fidelity, or is discarded, coming out.
pub struct BbpsswPurification {
    name: String,
    owner: String,
    remote_node: String,
    keep_key: StateKey,
    keep_remote_key: StateKey,
    meas_key: StateKey,
    meas_remote_key: StateKey,
    /// This node's local memory indices backing `keep_key`/`meas_key`, so a
    /// result can be reported back to the owning node's resource manager.
    keep_memo_index: usize,
    meas_memo_index: usize,
    status: ProtocolStatus,
    /// Whether this side is responsible for computing and broadcasting the
    /// measurement-comparison outcome — only one side should, to avoid both
    /// ends double-applying the same BDS update (the original asymmetrically
    /// picks `owner.name > remote_node_name`).
    is_primary: bool,
    own_measurement: Option<(bool, bool)>,
    rng: ChaCha8Rng,
}

impl BbpsswPurification {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        remote_node: impl Into<String>,
        keep_key: StateKey,
        keep_remote_key: StateKey,
        meas_key: StateKey,
        meas_remote_key: StateKey,
        keep_memo_index: usize,
        meas_memo_index: usize,
        rng: ChaCha8Rng,
    ) -> Self {
        let owner = owner.into();
        let remote_node = remote_node.into();
        let is_primary = owner > remote_node;
        Self {
            name: name.into(),
            owner,
            remote_node,
            keep_key,
            keep_remote_key,
            meas_key,
            meas_remote_key,
            keep_memo_index,
            meas_memo_index,
            status: ProtocolStatus::Created,
            is_primary,
            own_measurement: None,
            rng,
        }
    }

    /// BBPSSW's CNOT-based circuit on the ket/density formalisms: CNOT(keep,
    /// meas) on both sides, then measure the `meas` qubit; success iff both
    /// sides' measurement outcomes agree.
    fn run_circuit_variant(&mut self, timeline: &mut Timeline) -> Result<bool> {
        let mut circuit = Circuit::new();
        circuit.push(Gate::Cnot { control: 0, target: 1 }).measure(1);
        let keep_outcome = timeline.quantum_manager.run(&[self.keep_key, self.meas_key], &circuit, &mut self.rng)?;
        let meas_bit = keep_outcome.first().copied().unwrap_or(false);
        self.own_measurement = Some((meas_bit, meas_bit));
        Ok(meas_bit)
    }

    /// Analytic BDS update (§4.6): biased-coin trick avoiding an explicit
    /// circuit. `p_1 = (1 + sqrt(2*p_success - 1)) / 2` where `p_success` is
    /// the post-purification fidelity target; purification succeeds with
    /// probability `p_success` and on success the new fidelity follows the
    /// twirled BBPSSW formula.
    fn run_bds_variant(&mut self, timeline: &mut Timeline) -> Result<bool> {
        let keep = self.read_bds(timeline, self.keep_key)?;
        let meas = self.read_bds(timeline, self.meas_key)?;
        let (new_fidelity, p_success) = purification_result(keep, meas);

        let success = p_success > 0.0 && self.rng.gen::<f64>() < (1.0 + (2.0 * p_success - 1.0).max(0.0).sqrt()) / 2.0;

        if success {
            if self.is_primary {
                timeline.quantum_manager.set(
                    &[self.keep_key, self.keep_remote_key],
                    QuantumStateData::BellDiagonal {
                        keys: [self.keep_key, self.keep_remote_key],
                        components: [new_fidelity, (1.0 - new_fidelity) / 3.0, (1.0 - new_fidelity) / 3.0, (1.0 - new_fidelity) / 3.0],
                    },
                )?;
            }
            // The meas pair is spent on both sides regardless of which side
            // is primary; only the keep pair's residual state is asymmetric.
            timeline.quantum_manager.remove(self.meas_key)?;
            timeline.quantum_manager.remove(self.meas_remote_key)?;
            self.report_outcome(timeline, self.keep_memo_index, MemoryUpdate::Entangled {
                remote_node: self.remote_node.clone(),
                remote_memo: self.keep_memo_index,
                fidelity: new_fidelity,
                entangle_time: timeline.now(),
            });
        } else {
            // Both input pairs are spent on a failed attempt: every key this
            // protocol touches — kept and measured, local and remote —
            // reverts to RAW (§4.6: failure discards both pairs on both sides).
            self.reset_to_raw(timeline)?;
            self.report_outcome(timeline, self.keep_memo_index, MemoryUpdate::Raw);
        }
        self.report_outcome(timeline, self.meas_memo_index, MemoryUpdate::Raw);
        Ok(success)
    }

    /// Both input pairs are spent on a failed attempt: every key this
    /// protocol touches — kept and measured, local and remote — reverts to
    /// RAW (§4.6: purification failure discards both pairs on both sides).
    fn reset_to_raw(&self, timeline: &mut Timeline) -> Result<()> {
        timeline.quantum_manager.remove(self.keep_key)?;
        timeline.quantum_manager.remove(self.keep_remote_key)?;
        timeline.quantum_manager.remove(self.meas_key)?;
        timeline.quantum_manager.remove(self.meas_remote_key)?;
        Ok(())
    }

    fn report_outcome(&self, timeline: &mut Timeline, memo_index: usize, update: MemoryUpdate) {
        timeline.schedule(Event::new(timeline.now(), 0, self.owner.clone(), EventKind::MemoryUpdated { memo_index, update }));
    }

    fn read_bds(&self, timeline: &mut Timeline, key: StateKey) -> Result<[f64; 4]> {
        let state = timeline.quantum_manager.get(key)?;
        let guard = state.read();
        match &*guard {
            QuantumStateData::BellDiagonal { components, .. } => Ok(*components),
            _ => Err(SimError::InvalidState(format!("key {key} is not Bell-diagonal"))),
        }
    }
}

/// Twirled BBPSSW fidelity/success formula used by the analytic BDS variant
/// (§4.6): `F' = (F1·F2 + ((1-F1)/3)·((1-F2)/3)) / p_success`, where
/// `p_success` is the same twirled-state normalization generalized to two
/// possibly-distinct input fidelities.
pub fn purification_result(keep: [f64; 4], meas: [f64; 4]) -> (f64, f64) {
    let (f1, f2) = (keep[0], meas[0]);
    let other1 = (1.0 - f1) / 3.0;
    let other2 = (1.0 - f2) / 3.0;
    let p_success = f1 * f2 + f1 * other2 + other1 * f2 + 5.0 * other1 * other2;
    if p_success <= 0.0 {
        return (0.0, 0.0);
    }
    let new_fidelity = (f1 * f2 + other1 * other2) / p_success;
    (new_fidelity.clamp(0.0, 1.0), p_success.clamp(0.0, 1.0))
}

#[cfg(test)]
mod formula_tests {
    use super::purification_result;

    fn bds(f: f64) -> [f64; 4] {
        [f, (1.0 - f) / 3.0, (1.0 - f) / 3.0, (1.0 - f) / 3.0]
    }

    #[test]
    fn purification_strictly_improves_fidelity_above_one_half() {
        for tenths in 6..10 {
            let f = tenths as f64 / 10.0;
            let (new_fidelity, _) = purification_result(bds(f), bds(f));
            assert!(new_fidelity > f, "F={f} new_fidelity={new_fidelity}");
        }
    }

    #[test]
    fn purification_is_a_fixed_point_at_fidelity_one() {
        let (new_fidelity, p_success) = purification_result(bds(1.0), bds(1.0));
        assert!((new_fidelity - 1.0).abs() < 1e-9);
        assert!((p_success - 1.0).abs() < 1e-9);
    }
}

impl Protocol for BbpsswPurification {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> ProtocolStatus {
        self.status
    }

    fn start(&mut self, _timeline: &mut Timeline) {
        self.status = ProtocolStatus::Running;
    }

    fn received_message(&mut self, timeline: &mut Timeline, _src: String, payload: MessagePayload) {
        if let MessagePayload::PurificationStart { .. } = payload {
            let success = if timeline.quantum_manager.formalism() == Formalism::BellDiagonal {
                self.run_bds_variant(timeline)
            } else {
                self.run_circuit_variant(timeline)
            };
            self.status = match success {
                Ok(true) => ProtocolStatus::Succeeded,
                _ => ProtocolStatus::Failed,
            };
        }
    }
}
