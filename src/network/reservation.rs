//! RSVP-like reservation protocol: admission control along a path, with
//! non-overlapping per-memory time windows (§4.9, grounded on
//! `test_rsvp.py`'s `MemoryTimeCard` semantics).

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, SimError};
use crate::kernel::timeline::Timeline;
use crate::resource::manager::ResourceManager;
use crate::resource::memory_info::MemoryState;
use crate::resource::protocol::ProtocolKind;
use crate::resource::rule::PendingRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: u64,
    pub initiator: String,
    pub responder: String,
    pub start_time: u64,
    pub end_time: u64,
    pub memory_size: usize,
    pub target_fidelity: f64,
    pub path: Vec<String>,
}

impl Reservation {
    pub fn new(id: u64, initiator: impl Into<String>, responder: impl Into<String>, start_time: u64, end_time: u64, memory_size: usize, target_fidelity: f64) -> Self {
        Self {
            id,
            initiator: initiator.into(),
            responder: responder.into(),
            start_time,
            end_time,
            memory_size,
            target_fidelity,
            path: Vec::new(),
        }
    }

    pub fn overlaps(&self, other_start: u64, other_end: u64) -> bool {
        self.start_time < other_end && other_start < self.end_time
    }
}

/// One memory's booked-out windows, kept sorted by start time so overlap
/// checks and insertion are both `O(log n)`.
#[derive(Debug, Default)]
pub struct MemoryTimeCard {
    windows: BTreeMap<u64, u64>, // start -> end
}

impl MemoryTimeCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether `[start, end)` is free, without reserving it. Adjacent
    /// reservations must not even touch: the card's invariant is
    /// `reservations[i-1].end_time < reservations[i].start_time`, strictly.
    pub fn is_available(&self, start: u64, end: u64) -> bool {
        self.windows.range(..end).next_back().map_or(true, |(_, &existing_end)| existing_end < start)
            && self.windows.range(start..).next().map_or(true, |(&existing_start, _)| existing_start > end)
    }

    pub fn add(&mut self, memory: usize, start: u64, end: u64) -> Result<()> {
        if !self.is_available(start, end) {
            return Err(SimError::ReservationConflict { memory, start, end });
        }
        self.windows.insert(start, end);
        Ok(())
    }

    pub fn remove(&mut self, start: u64) {
        self.windows.remove(&start);
    }
}

/// Per-memory reservation table for one node, plus admission control across
/// all of its memories.
#[derive(Default)]
pub struct ResourceReservationProtocol {
    cards: Vec<MemoryTimeCard>,
    reservations: Vec<Reservation>,
    /// Memory indices claimed by each still-live reservation, so `pop` can
    /// release exactly what `push` claimed without the caller having to
    /// remember it.
    claims: HashMap<u64, Vec<usize>>,
}

impl ResourceReservationProtocol {
    pub fn new(memory_count: usize) -> Self {
        Self { cards: (0..memory_count).map(|_| MemoryTimeCard::new()).collect(), reservations: Vec::new(), claims: HashMap::new() }
    }

    /// Books `reservation.memory_size` distinct memories for the requested
    /// window, or none at all: a reservation that can only be partly
    /// satisfied is rejected and whatever it did claim is rolled back before
    /// returning, so a failed `push` never leaves stray bookings behind
    /// (§4.9 edge case: insufficient free memory rejects the whole
    /// reservation, not a partial grant).
    pub fn push(&mut self, reservation: Reservation) -> Result<Vec<usize>> {
        let mut claimed = Vec::with_capacity(reservation.memory_size);
        for (index, card) in self.cards.iter_mut().enumerate() {
            if claimed.len() == reservation.memory_size {
                break;
            }
            if card.add(index, reservation.start_time, reservation.end_time).is_ok() {
                claimed.push(index);
            }
        }

        if claimed.len() < reservation.memory_size {
            for &index in &claimed {
                self.cards[index].remove(reservation.start_time);
            }
            return Err(SimError::AdmissionRejected(format!(
                "only {} of {} requested memories free for window [{}, {})",
                claimed.len(),
                reservation.memory_size,
                reservation.start_time,
                reservation.end_time
            )));
        }

        self.claims.insert(reservation.id, claimed.clone());
        self.reservations.push(reservation);
        Ok(claimed)
    }

    /// Releases every memory `push` claimed for `reservation_id`, if it's
    /// still live.
    pub fn pop(&mut self, reservation_id: u64) {
        let Some(pos) = self.reservations.iter().position(|r| r.id == reservation_id) else { return };
        let reservation = self.reservations.remove(pos);
        let Some(indices) = self.claims.remove(&reservation_id) else { return };
        for index in indices {
            if let Some(card) = self.cards.get_mut(index) {
                card.remove(reservation.start_time);
            }
        }
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn claimed_memories(&self, reservation_id: u64) -> Option<&[usize]> {
        self.claims.get(&reservation_id).map(Vec::as_slice)
    }
}

/// Validates a reservation request along a full path before any individual
/// node admits it, mirroring the RSVP PATH-message model: every hop must
/// have room, or the whole request is rejected (§4.9).
pub fn admit_along_path(path_capacity: &mut [ResourceReservationProtocol], reservation: &Reservation) -> Result<Vec<Vec<usize>>> {
    let mut claimed = Vec::with_capacity(path_capacity.len());
    for node_table in path_capacity.iter_mut() {
        match node_table.push(reservation.clone()) {
            Ok(indices) => claimed.push(indices),
            Err(err) => {
                for table in path_capacity.iter_mut().take(claimed.len()) {
                    table.pop(reservation.id);
                }
                return Err(err);
            }
        }
    }
    Ok(claimed)
}

/// Installs a generation rule on each hop's newly-claimed memories so they
/// immediately start trying to entangle with the next node in the path,
/// rather than sitting idle until some unrelated event re-scans them (§4.9
/// step 3: admission success starts entanglement activity).
pub fn install_reservation_rules(timeline: &mut Timeline, managers: &mut [&mut ResourceManager], reservation: &Reservation, claimed: &[Vec<usize>]) {
    for (manager, indices) in managers.iter_mut().zip(claimed.iter()) {
        let Some(hop) = reservation.path.iter().position(|n| n == &manager.node_name) else { continue };
        let Some(next_node) = reservation.path.get(hop + 1) else { continue };
        let next_node = next_node.clone();
        let reservation_id = reservation.id;
        let claimed_here = indices.clone();
        manager.load_rule(
            timeline,
            0,
            ProtocolKind::Generation,
            Box::new(move |info| claimed_here.contains(&info.index) && info.state == MemoryState::Raw),
            Box::new(move |info| {
                Some(PendingRequest {
                    protocol_name: format!("rsvp_{reservation_id}_gen_{}", info.index),
                    remote_node: next_node.clone(),
                    protocol_kind: ProtocolKind::Generation,
                    args: serde_json::json!({ "reservation_id": reservation_id }),
                })
            }),
        );
    }
}

/// The full §4.9 step-3 pipeline a reservation request should drive:
/// admit along the path, then — only on success — install the rules that
/// actually start using the memories it claimed.
pub fn admit_and_install_rules(
    timeline: &mut Timeline,
    path_capacity: &mut [ResourceReservationProtocol],
    managers: &mut [&mut ResourceManager],
    reservation: &Reservation,
) -> Result<Vec<Vec<usize>>> {
    let claimed = admit_along_path(path_capacity, reservation)?;
    install_reservation_rules(timeline, managers, reservation, &claimed);
    Ok(claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_overlapping_windows_both_succeed() {
        let mut card = MemoryTimeCard::new();
        card.add(0, 0, 100).unwrap();
        card.add(0, 101, 200).unwrap();
    }

    #[test]
    fn touching_windows_are_rejected_per_strict_card_invariant() {
        let mut card = MemoryTimeCard::new();
        card.add(0, 0, 100).unwrap();
        assert!(card.add(0, 100, 200).is_err());
    }

    #[test]
    fn overlapping_window_is_rejected() {
        let mut card = MemoryTimeCard::new();
        card.add(0, 0, 100).unwrap();
        assert!(card.add(0, 50, 150).is_err());
    }

    #[test]
    fn admission_picks_first_free_memory() {
        let mut rrp = ResourceReservationProtocol::new(2);
        let r1 = Reservation::new(1, "a", "b", 0, 100, 1, 0.9);
        let r2 = Reservation::new(2, "a", "b", 0, 100, 1, 0.9);
        let idx1 = rrp.push(r1).unwrap();
        let idx2 = rrp.push(r2).unwrap();
        assert_ne!(idx1, idx2);
    }

    #[test]
    fn third_overlapping_reservation_is_rejected_when_memories_exhausted() {
        let mut rrp = ResourceReservationProtocol::new(1);
        rrp.push(Reservation::new(1, "a", "b", 0, 100, 1, 0.9)).unwrap();
        let result = rrp.push(Reservation::new(2, "a", "b", 50, 150, 1, 0.9));
        assert!(result.is_err());
    }

    #[test]
    fn a_reservation_claims_exactly_memory_size_cards_atomically() {
        let mut rrp = ResourceReservationProtocol::new(3);
        let claimed = rrp.push(Reservation::new(1, "a", "b", 0, 100, 2, 0.9)).unwrap();
        assert_eq!(claimed.len(), 2);
        // The third memory is still free for an unrelated window-overlapping
        // reservation that only needs one card.
        assert!(rrp.push(Reservation::new(2, "a", "b", 0, 100, 1, 0.9)).is_ok());
    }

    #[test]
    fn requesting_one_more_memory_than_exists_is_rejected_without_partial_claims() {
        let mut rrp = ResourceReservationProtocol::new(2);
        let result = rrp.push(Reservation::new(1, "a", "b", 0, 100, 3, 0.9));
        assert!(result.is_err());
        assert!(rrp.reservations().is_empty());
        // Nothing was left claimed by the failed attempt: a full 2-card
        // reservation for a different window must still succeed.
        assert_eq!(rrp.push(Reservation::new(2, "a", "b", 0, 100, 2, 0.9)).unwrap().len(), 2);
    }

    #[test]
    fn pop_releases_every_card_push_claimed() {
        let mut rrp = ResourceReservationProtocol::new(2);
        rrp.push(Reservation::new(1, "a", "b", 0, 100, 2, 0.9)).unwrap();
        rrp.pop(1);
        assert!(rrp.reservations().is_empty());
        // Both cards are free again, not just one.
        assert_eq!(rrp.push(Reservation::new(2, "a", "b", 0, 100, 2, 0.9)).unwrap().len(), 2);
    }
}
