//! Reservation ledger: which requester holds which helper capacity.
//!
//! Every successful match opens a reservation. A completion report closes one.
//! Without a lease the ledger is bookkeeping only: a requester that vanishes
//! mid-exchange leaves its helper's load inflated. With a lease configured,
//! `expire` hands back the reservations older than the TTL so the broker can
//! release their load.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use peerai_core::PeerId;

#[derive(Debug, Clone)]
pub struct Reservation {
    pub requester: PeerId,
    pub helper: PeerId,
    pub created_at: Instant,
}

#[derive(Debug, Default)]
pub struct ReservationLedger {
    /// Oldest first.
    open: VecDeque<Reservation>,
    ttl: Option<Duration>,
}

impl ReservationLedger {
    /// `ttl_secs == 0` disables expiry.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            open: VecDeque::new(),
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
        }
    }

    pub fn open(&mut self, requester: PeerId, helper: PeerId) {
        self.open_at(requester, helper, Instant::now());
    }

    fn open_at(&mut self, requester: PeerId, helper: PeerId, created_at: Instant) {
        self.open.push_back(Reservation {
            requester,
            helper,
            created_at,
        });
    }

    /// Close the oldest reservation `requester` holds on `helper`.
    /// Returns false if it holds none.
    pub fn close(&mut self, helper: &PeerId, requester: &PeerId) -> bool {
        let pos = self
            .open
            .iter()
            .position(|r| &r.helper == helper && &r.requester == requester);
        match pos {
            Some(i) => self.open.remove(i).is_some(),
            None => false,
        }
    }

    /// Forget every reservation involving `peer` on either side.
    pub fn forget(&mut self, peer: &PeerId) -> usize {
        let before = self.open.len();
        self.open
            .retain(|r| &r.requester != peer && &r.helper != peer);
        before - self.open.len()
    }

    pub fn lease_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Remove and return reservations whose lease ran out by `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<Reservation> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        self.open.retain(|r| {
            if now.saturating_duration_since(r.created_at) >= ttl {
                expired.push(r.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
