use std::path::Path;

use relaycraft_cache::{CacheIterator, CacheOptions, CacheStorage};
use relaycraft_core::{Session, SessionHeader};

use crate::Result;

/// Cache key of a session: hex(app key || height_be || chain)
pub fn session_cache_key(header: &SessionHeader) -> String {
    let mut bytes = Vec::with_capacity(32 + 8 + header.chain.len());
    bytes.extend_from_slice(&header.application_public_key);
    bytes.extend_from_slice(&header.session_block_height.to_be_bytes());
    bytes.extend_from_slice(header.chain.as_bytes());
    hex::encode(bytes)
}

/// Session cache of one servicer identity
pub struct SessionStore {
    cache: CacheStorage<Session>,
}

impl SessionStore {
    /// Memory-only store; sessions are re-derivable so this is the default
    pub fn ephemeral(max_entries: usize) -> Self {
        Self {
            cache: CacheStorage::ephemeral("sessions", max_entries),
        }
    }

    pub fn open(path: impl AsRef<Path>, name: &str, options: &CacheOptions, max_entries: usize) -> Result<Self> {
        Ok(Self {
            cache: CacheStorage::init(path, name, options, max_entries, false)?,
        })
    }

    pub fn get_session(&self, header: &SessionHeader) -> Result<Option<Session>> {
        Ok(self.cache.get(&session_cache_key(header))?)
    }

    pub fn set_session(&self, session: Session) -> Result<()> {
        let key = session_cache_key(&session.header);
        Ok(self.cache.set(&key, session)?)
    }

    pub fn delete_session(&self, header: &SessionHeader) -> Result<()> {
        Ok(self.cache.delete(&session_cache_key(header))?)
    }

    pub fn clear(&self) -> Result<()> {
        Ok(self.cache.clear()?)
    }

    pub fn iterator(&self) -> Result<CacheIterator> {
        Ok(self.cache.iterator()?)
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.cache.flush_to_db()?)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycraft_core::Address;

    fn session(app: u8, height: u64) -> Session {
        Session {
            header: SessionHeader::new([app; 32], "0001", height),
            session_key: [9u8; 32],
            session_nodes: vec![Address([1u8; 20]), Address([2u8; 20])],
        }
    }

    #[test]
    fn test_key_distinguishes_header_fields() {
        let a = SessionHeader::new([1u8; 32], "0001", 1);
        let b = SessionHeader::new([1u8; 32], "0002", 1);
        let c = SessionHeader::new([1u8; 32], "0001", 5);
        assert_ne!(session_cache_key(&a), session_cache_key(&b));
        assert_ne!(session_cache_key(&a), session_cache_key(&c));
        assert_eq!(session_cache_key(&a), session_cache_key(&a.clone()));
    }

    #[test]
    fn test_set_get_delete() {
        let store = SessionStore::ephemeral(16);
        let s = session(1, 1);
        store.set_session(s.clone()).unwrap();
        assert_eq!(store.get_session(&s.header).unwrap(), Some(s.clone()));

        store.delete_session(&s.header).unwrap();
        assert_eq!(store.get_session(&s.header).unwrap(), None);
    }

    #[test]
    fn test_clear_empties_iterator() {
        let store = SessionStore::ephemeral(16);
        store.set_session(session(1, 1)).unwrap();
        store.set_session(session(2, 1)).unwrap();
        assert_eq!(store.iterator().unwrap().count(), 2);

        store.clear().unwrap();
        assert_eq!(store.iterator().unwrap().count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_durable_store_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let s = session(3, 5);
        {
            let store = SessionStore::open(dir.path(), "sessions", &CacheOptions::default(), 4).unwrap();
            store.set_session(s.clone()).unwrap();
        }
        let store = SessionStore::open(dir.path(), "sessions", &CacheOptions::default(), 4).unwrap();
        assert_eq!(store.get_session(&s.header).unwrap(), Some(s));
    }
}
