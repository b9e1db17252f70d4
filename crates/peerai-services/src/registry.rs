//! Presence registry: every connected peer and its load/help counters.
//!
//! The registry is owned by the broker task and is never shared; every
//! mutation below is a single step applied to one record. Iteration order is
//! connection order, which is also the matchmaker's tie-break order.

use std::collections::{HashMap, HashSet};

use peerai_core::{PeerId, PeerRecord, RegistrySnapshot};

#[derive(Debug, Default)]
pub struct Registry {
    records: HashMap<PeerId, PeerRecord>,
    /// Insertion order of live ids.
    order: Vec<PeerId>,
    /// Ids whose capability has been announced.
    announced: HashSet<PeerId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly connected peer. Re-registering a live id is a no-op.
    pub fn register(&mut self, id: PeerId) -> PeerRecord {
        if let Some(existing) = self.records.get(&id) {
            return *existing;
        }
        let record = PeerRecord::default();
        self.order.push(id.clone());
        self.records.insert(id, record);
        record
    }

    /// Record a peer's join announcement and return the online count.
    ///
    /// The first announcement fixes the flag; a later conflicting one is
    /// ignored and `None` is returned so the caller can log it.
    pub fn set_capability(&mut self, id: &PeerId, capable: bool) -> Option<usize> {
        let record = self.records.get_mut(id)?;
        if !self.announced.insert(id.clone()) && record.capable != capable {
            return None;
        }
        record.capable = capable;
        Some(self.records.len())
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<PeerRecord> {
        let record = self.records.remove(id)?;
        self.order.retain(|k| k != id);
        self.announced.remove(id);
        Some(record)
    }

    pub fn increment_load(&mut self, id: &PeerId) -> Option<u32> {
        let record = self.records.get_mut(id)?;
        record.load = record.load.saturating_add(1);
        Some(record.load)
    }

    /// Decrement load, clamped at zero.
    pub fn decrement_load(&mut self, id: &PeerId) -> Option<u32> {
        let record = self.records.get_mut(id)?;
        record.load = record.load.saturating_sub(1);
        Some(record.load)
    }

    pub fn increment_helped(&mut self, id: &PeerId) -> Option<u64> {
        let record = self.records.get_mut(id)?;
        record.helped += 1;
        Some(record.helped)
    }

    /// A finished task: one less in flight, one more serviced.
    pub fn complete(&mut self, id: &PeerId) -> Option<PeerRecord> {
        let record = self.records.get_mut(id)?;
        record.load = record.load.saturating_sub(1);
        record.helped += 1;
        Some(*record)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &PeerRecord)> {
        self.order
            .iter()
            .filter_map(move |id| self.records.get(id).map(|r| (id, r)))
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.iter().map(|(id, r)| (id.clone(), *r)).collect())
    }
}
