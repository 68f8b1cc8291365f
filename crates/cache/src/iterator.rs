//! Snapshot cursor over a cache
//!
//! Every call to [`CacheStorage::iterator`](crate::CacheStorage::iterator)
//! takes a fresh, key-ordered snapshot, so the cursor is finite and never
//! observes writes made after it was created.

use serde::de::DeserializeOwned;

use crate::{codec, Result};

/// A persisted record: key plus its encoded bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub bytes: Vec<u8>,
}

impl RawEntry {
    /// Decode the record in the current encoding
    pub fn value<V: DeserializeOwned>(&self) -> Result<V> {
        codec::decode(&self.bytes)
    }

    pub fn is_current(&self) -> bool {
        codec::is_current(&self.bytes)
    }
}

/// Ordered cursor over a snapshot of cache records
pub struct CacheIterator {
    entries: std::vec::IntoIter<RawEntry>,
    remaining: usize,
}

impl CacheIterator {
    pub(crate) fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            remaining: entries.len(),
            entries: entries.into_iter(),
        }
    }

    /// Entries not yet yielded
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Release the snapshot; dropping the cursor does the same
    pub fn close(self) {}
}

impl Iterator for CacheIterator {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        let entry = self.entries.next()?;
        self.remaining -= 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for CacheIterator {}
