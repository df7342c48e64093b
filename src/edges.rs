//! Edge storage shared by both sides of the dependency bookkeeping.
//!
//! Most nodes have a handful of readers and a handful of inputs, so edges
//! live in a flat slot buffer where a linear scan beats hashing. Removal
//! tombstones the slot in place and never reshuffles, which makes index-based
//! iteration safe while entries are being pruned mid-walk. Once a map grows
//! past [`DENSE_THRESHOLD`] live entries it transparently gains a hash index
//! from key address to slot; semantics are unchanged.

use std::collections::HashMap;

/// Live-entry count beyond which a map builds its hash index.
pub(crate) const DENSE_THRESHOLD: usize = 100;

/// Keys are compared by a stable address rather than by value.
///
/// For `Rc`/`Weak` keys this is the allocation's data address, which stays
/// valid for identity comparison even after the target is reclaimed.
pub(crate) trait EdgeKey {
    /// The address this key is identified by.
    fn addr(&self) -> usize;
}

/// An insertion-ordered map from edge keys to small copyable records.
pub(crate) struct EdgeMap<K, V> {
    /// Flat buffer of slots; `None` is a tombstone left by removal.
    slots: Vec<Option<(K, V)>>,
    /// Number of occupied slots.
    live: usize,
    /// Address-to-slot index, built once the map grows dense.
    index: Option<HashMap<usize, usize, ahash::RandomState>>,
}

impl<K, V> Default for EdgeMap<K, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            index: None,
        }
    }
}

impl<K: EdgeKey, V: Copy> EdgeMap<K, V> {
    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Number of tombstoned slots awaiting compaction.
    pub fn tombstones(&self) -> usize {
        self.slots.len() - self.live
    }

    /// Upper bound for index-based iteration via [`EdgeMap::slot`].
    ///
    /// Slots past this bound at the start of a walk may appear if entries are
    /// inserted mid-walk; visiting them is harmless.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The entry at slot `i`, or `None` for a tombstone.
    pub fn slot(&self, i: usize) -> Option<(K, V)>
    where
        K: Clone,
    {
        self.slots[i].as_ref().map(|(k, v)| (k.clone(), *v))
    }

    /// Look up the record for the key with the given address.
    pub fn get(&self, addr: usize) -> Option<V> {
        self.find(addr)
            .and_then(|i| self.slots[i].as_ref().map(|(_, v)| *v))
    }

    /// Insert or overwrite the record for `key`.
    ///
    /// Overwriting replaces the stored key as well: an address may be reused
    /// by a new allocation after its previous occupant was reclaimed, and
    /// the live key must win.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(i) = self.find(key.addr()) {
            self.slots[i] = Some((key, value));
            return;
        }
        let addr = key.addr();
        self.slots.push(Some((key, value)));
        self.live += 1;
        let slot = self.slots.len() - 1;
        if let Some(index) = self.index.as_mut() {
            index.insert(addr, slot);
        } else if self.live > DENSE_THRESHOLD {
            self.build_index();
        }
    }

    /// Remove the entry with the given address, leaving a tombstone.
    pub fn remove(&mut self, addr: usize) -> bool {
        let Some(i) = self.find(addr) else {
            return false;
        };
        self.slots[i] = None;
        self.live -= 1;
        if let Some(index) = self.index.as_mut() {
            index.remove(&addr);
        }
        true
    }

    /// Compact tombstones and rebuild the index. Callers must not be walking
    /// the map when this runs; correctness never depends on it running at
    /// all.
    pub fn defragment(&mut self) {
        self.slots.retain(Option::is_some);
        if self.index.is_some() {
            self.build_index();
        }
    }

    fn find(&self, addr: usize) -> Option<usize> {
        if let Some(index) = self.index.as_ref() {
            return index.get(&addr).copied();
        }
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .map(|(k, _)| k.addr() == addr)
                .unwrap_or(false)
        })
    }

    fn build_index(&mut self) {
        let mut index =
            HashMap::with_capacity_and_hasher(self.slots.len(), ahash::RandomState::new());
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some((k, _)) = slot {
                index.insert(k.addr(), i);
            }
        }
        self.index = Some(index);
    }
}
