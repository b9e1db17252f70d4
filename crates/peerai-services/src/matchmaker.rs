//! Load-aware helper selection.
//!
//! Eligible helpers are capable peers other than the requester. The one with
//! the lowest load wins; on equal load the earliest-connected peer wins,
//! because the registry iterates in connection order and only a strictly
//! lower load replaces the current best.

use peerai_core::PeerId;

use crate::registry::Registry;

/// Pick the least-loaded eligible helper without touching the registry.
pub fn select_helper(registry: &Registry, requester: &PeerId) -> Option<PeerId> {
    let mut best: Option<(&PeerId, u32)> = None;
    for (id, record) in registry.iter() {
        if !record.capable || id == requester {
            continue;
        }
        match best {
            Some((_, load)) if load <= record.load => {}
            _ => best = Some((id, record.load)),
        }
    }
    best.map(|(id, _)| id.clone())
}

/// Select a helper and reserve capacity on it by bumping its load.
///
/// The reservation has no expiry of its own; see `ReservationLedger` for
/// the opt-in lease.
pub fn find_helper(registry: &mut Registry, requester: &PeerId) -> Option<PeerId> {
    let helper = select_helper(registry, requester)?;
    registry.increment_load(&helper);
    Some(helper)
}
