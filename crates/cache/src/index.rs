//! In-memory LRU index
//!
//! Entries are stamped with a monotonically increasing tick on every
//! touch; `recency` maps ticks back to keys so the oldest entry is found
//! without scanning.

use std::collections::{BTreeMap, HashMap};

/// A cached value
pub(crate) struct Slot<V> {
    pub value: V,
    tick: u64,
    /// Written to memory but not yet to the backing store
    pub dirty: bool,
}

pub(crate) struct Index<V> {
    entries: HashMap<String, Slot<V>>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    max_entries: usize,
}

impl<V> Index<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            max_entries: max_entries.max(1),
        }
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Look up and mark as most recently used
    pub fn get(&mut self, key: &str) -> Option<&Slot<V>> {
        let tick = self.tick();
        let slot = self.entries.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(slot)
    }

    /// Look up without touching recency
    pub fn peek(&self, key: &str) -> Option<&Slot<V>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// True if inserting `key` would need an eviction first
    pub fn needs_eviction(&self, key: &str) -> bool {
        !self.entries.contains_key(key) && self.entries.len() >= self.max_entries
    }

    /// Remove and return the least recently used entry
    pub fn pop_oldest(&mut self) -> Option<(String, Slot<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot))
    }

    /// Insert or replace; the caller evicts beforehand
    pub fn insert(&mut self, key: String, value: V, dirty: bool) {
        let tick = self.tick();
        if let Some(old) = self.entries.remove(&key) {
            self.recency.remove(&old.tick);
        }
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, Slot { value, tick, dirty });
    }

    /// Put back an evicted entry (eviction write-back failed)
    pub fn restore(&mut self, key: String, slot: Slot<V>) {
        self.insert(key, slot.value, slot.dirty);
    }

    pub fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Slot<V>)> {
        self.entries.iter()
    }

    pub fn mark_all_clean(&mut self) {
        for slot in self.entries.values_mut() {
            slot.dirty = false;
        }
    }
}
