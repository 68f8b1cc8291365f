use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::index::Index;
use crate::iterator::{CacheIterator, RawEntry};
use crate::{
    codec, db_err, CacheError, CacheObject, Result, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION,
};

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const METADATA: TableDefinition<&str, u32> = TableDefinition::new("metadata");
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Default redb page cache (16 MiB)
const DEFAULT_DB_CACHE_BYTES: usize = 16 * 1024 * 1024;

/// Backing store tuning
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// redb page cache size in bytes
    pub db_cache_bytes: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            db_cache_bytes: DEFAULT_DB_CACHE_BYTES,
        }
    }
}

/// Durable half of a cache
struct Backing {
    db: Database,
    path: PathBuf,
}

impl Backing {
    fn open(path: &Path, options: &CacheOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::builder()
            .set_cache_size(options.db_cache_bytes)
            .create(path)
            .map_err(db_err)?;

        // Create both tables up front so read transactions never miss them
        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(RECORDS).map_err(db_err)?;
        txn.open_table(METADATA).map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(RECORDS).map_err(db_err)?;
        let value = table
            .get(key)
            .map_err(db_err)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(db_err)?;
            table.insert(key, bytes).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn write_batch(&self, records: &[(String, Vec<u8>)]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(db_err)?;
            for (key, bytes) in records {
                table.insert(key.as_str(), bytes.as_slice()).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn remove_all(&self) -> Result<usize> {
        let txn = self.db.begin_write().map_err(db_err)?;
        let removed;
        {
            let mut table = txn.open_table(RECORDS).map_err(db_err)?;
            let mut keys = Vec::new();
            for item in table.iter().map_err(db_err)? {
                let (key, _) = item.map_err(db_err)?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(db_err)?;
            }
            removed = keys.len();
        }
        txn.commit().map_err(db_err)?;
        Ok(removed)
    }

    fn entries(&self) -> Result<Vec<RawEntry>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(RECORDS).map_err(db_err)?;
        let mut entries = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (key, value) = item.map_err(db_err)?;
            entries.push(RawEntry {
                key: key.value().to_string(),
                bytes: value.value().to_vec(),
            });
        }
        Ok(entries)
    }

    fn is_empty(&self) -> Result<bool> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(RECORDS).map_err(db_err)?;
        let mut iter = table.iter().map_err(db_err)?;
        let empty = iter.next().is_none();
        Ok(empty)
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(METADATA).map_err(db_err)?;
        let version = table
            .get(SCHEMA_VERSION_KEY)
            .map_err(db_err)?
            .map(|guard| guard.value());
        Ok(version)
    }

    fn write_schema_version(&self, version: u32) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(METADATA).map_err(db_err)?;
            table.insert(SCHEMA_VERSION_KEY, version).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    fn ensure_schema_supported(&self) -> Result<()> {
        match self.schema_version()? {
            Some(found) if found > CURRENT_SCHEMA_VERSION => Err(CacheError::UnsupportedSchema {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            }),
            Some(found) if found < CURRENT_SCHEMA_VERSION => Err(CacheError::MigrationRequired {
                found,
                required: CURRENT_SCHEMA_VERSION,
            }),
            Some(_) => Ok(()),
            None => {
                if self.is_empty()? {
                    self.write_schema_version(CURRENT_SCHEMA_VERSION)
                } else {
                    Err(CacheError::MigrationRequired {
                        found: LEGACY_SCHEMA_VERSION,
                        required: CURRENT_SCHEMA_VERSION,
                    })
                }
            }
        }
    }
}

/// Capacity-bounded cache with optional write-through persistence.
///
/// Normal operations (`get`, `set`, `delete`, `flush_to_db`, ...) take an
/// internal lock that serializes the memory index together with the
/// durable write. The `*_without_lock*` methods take `&mut self` instead:
/// they are meant for single-threaded bulk work (format migration) before
/// the store is shared, and the exclusive borrow is what keeps them from
/// running concurrently with traffic.
pub struct CacheStorage<V: CacheObject> {
    name: String,
    max_entries: usize,
    index: Mutex<Index<V>>,
    backing: Option<Backing>,
}

impl<V: CacheObject> CacheStorage<V> {
    /// Configure a cache of at most `max_entries` in-memory values.
    ///
    /// Non-ephemeral stores persist to `path/name` and refuse to open if the
    /// records there need migrating. Ephemeral stores never touch disk.
    pub fn init(
        path: impl AsRef<Path>,
        name: &str,
        options: &CacheOptions,
        max_entries: usize,
        ephemeral: bool,
    ) -> Result<Self> {
        if ephemeral {
            return Ok(Self::ephemeral(name, max_entries));
        }
        let store = Self::open_durable(path.as_ref(), name, options, max_entries)?;
        if let Some(backing) = &store.backing {
            backing.ensure_schema_supported()?;
        }
        info!(
            cache = name,
            max_entries,
            "Opened durable cache at {:?}",
            store.path()
        );
        Ok(store)
    }

    /// Memory-only cache
    pub fn ephemeral(name: &str, max_entries: usize) -> Self {
        Self {
            name: name.to_string(),
            max_entries,
            index: Mutex::new(Index::new(max_entries)),
            backing: None,
        }
    }

    /// Open a durable store without the schema check, for migration only
    pub fn open_for_migration(
        path: impl AsRef<Path>,
        name: &str,
        options: &CacheOptions,
        max_entries: usize,
    ) -> Result<Self> {
        Self::open_durable(path.as_ref(), name, options, max_entries)
    }

    fn open_durable(
        path: &Path,
        name: &str,
        options: &CacheOptions,
        max_entries: usize,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "durable cache requires a database name",
            )));
        }
        let backing = Backing::open(&path.join(name), options)?;
        Ok(Self {
            name: name.to_string(),
            max_entries,
            index: Mutex::new(Index::new(max_entries)),
            backing: Some(backing),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn is_ephemeral(&self) -> bool {
        self.backing.is_none()
    }

    /// Location of the backing database, if any
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_ref().map(|b| b.path.as_path())
    }

    /// Number of values currently held in memory
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a value: memory first, then the backing store
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        let mut index = self.index.lock();
        if let Some(slot) = index.get(key) {
            return Ok(Some(slot.value.clone()));
        }
        let Some(backing) = &self.backing else {
            return Ok(None);
        };
        let Some(bytes) = backing.read(key)? else {
            return Ok(None);
        };
        let value: V = codec::decode(&bytes)?;
        make_room(&mut index, Some(backing), key, &self.name)?;
        index.insert(key.to_string(), value.clone(), false);
        Ok(Some(value))
    }

    /// Insert or update; durable stores commit before returning.
    ///
    /// Fails with [`CacheError::Sealed`] if the stored value is sealed.
    pub fn set(&self, key: &str, value: V) -> Result<()> {
        let mut index = self.index.lock();
        self.ensure_not_sealed(&mut index, key)?;
        if let Some(backing) = &self.backing {
            backing.write(key, &codec::encode(&value)?)?;
        }
        make_room(&mut index, self.backing.as_ref(), key, &self.name)?;
        index.insert(key.to_string(), value, false);
        Ok(())
    }

    fn ensure_not_sealed(&self, index: &mut Index<V>, key: &str) -> Result<()> {
        let sealed = match index.peek(key) {
            Some(slot) => slot.value.is_sealed(),
            None => match &self.backing {
                Some(backing) => match backing.read(key)? {
                    Some(bytes) => codec::decode::<V>(&bytes)?.is_sealed(),
                    None => false,
                },
                None => false,
            },
        };
        if sealed {
            return Err(CacheError::Sealed(key.to_string()));
        }
        Ok(())
    }

    /// Memory-only write that skips the lock and the seal check.
    ///
    /// The caller owns the store exclusively (startup migration); the value
    /// reaches disk on the next flush or when it is evicted.
    pub fn set_without_lock_and_seal_check(&mut self, key: &str, value: V) -> Result<()> {
        let dirty = self.backing.is_some();
        let index = self.index.get_mut();
        make_room(index, self.backing.as_ref(), key, &self.name)?;
        index.insert(key.to_string(), value, dirty);
        Ok(())
    }

    /// Write an already encoded record straight to the backing store
    pub fn insert_raw_without_lock(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.index.get_mut().remove(key);
        if let Some(backing) = &self.backing {
            backing.write(key, bytes)?;
        }
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut index = self.index.lock();
        index.remove(key);
        if let Some(backing) = &self.backing {
            backing.remove(key)?;
        }
        Ok(())
    }

    /// Delete variant for exclusive (migration) use
    pub fn delete_without_lock(&mut self, key: &str) -> Result<()> {
        self.index.get_mut().remove(key);
        if let Some(backing) = &self.backing {
            backing.remove(key)?;
        }
        Ok(())
    }

    /// Drop every entry from memory and from the backing store
    pub fn clear(&self) -> Result<()> {
        let mut index = self.index.lock();
        index.clear();
        if let Some(backing) = &self.backing {
            let removed = backing.remove_all()?;
            debug!(cache = %self.name, removed, "Cleared durable records");
        }
        Ok(())
    }

    /// Key-ordered snapshot of every record (memory and disk)
    pub fn iterator(&self) -> Result<CacheIterator> {
        let index = self.index.lock();
        let mut records: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        if let Some(backing) = &self.backing {
            for entry in backing.entries()? {
                records.insert(entry.key, entry.bytes);
            }
        }
        for (key, slot) in index.iter() {
            if self.backing.is_none() || slot.dirty {
                records.insert(key.clone(), codec::encode(&slot.value)?);
            }
        }
        let entries = records
            .into_iter()
            .map(|(key, bytes)| RawEntry { key, bytes })
            .collect();
        Ok(CacheIterator::new(entries))
    }

    /// Persist every in-memory value. No-op for ephemeral stores.
    pub fn flush_to_db(&self) -> Result<usize> {
        let mut index = self.index.lock();
        flush(&mut index, self.backing.as_ref())
    }

    /// Flush variant for exclusive (migration / startup) use
    pub fn flush_to_db_without_lock(&mut self) -> Result<usize> {
        let index = self.index.get_mut();
        flush(index, self.backing.as_ref())
    }

    /// Schema version recorded in the backing store
    pub fn schema_version(&self) -> Result<Option<u32>> {
        match &self.backing {
            Some(backing) => backing.schema_version(),
            None => Ok(None),
        }
    }

    pub fn set_schema_version(&mut self, version: u32) -> Result<()> {
        if let Some(backing) = &self.backing {
            backing.write_schema_version(version)?;
        }
        Ok(())
    }
}

/// Evict least recently used entries until `key` fits, writing back
/// dirty entries first so nothing unflushed is lost.
fn make_room<V: CacheObject>(
    index: &mut Index<V>,
    backing: Option<&Backing>,
    key: &str,
    name: &str,
) -> Result<()> {
    while index.needs_eviction(key) {
        let Some((evicted, slot)) = index.pop_oldest() else {
            break;
        };
        if slot.dirty {
            if let Some(backing) = backing {
                let written = codec::encode(&slot.value).and_then(|bytes| backing.write(&evicted, &bytes));
                if let Err(err) = written {
                    index.restore(evicted, slot);
                    return Err(err);
                }
            }
        }
        debug!(cache = name, key = %evicted, "Evicted least recently used entry");
    }
    Ok(())
}

fn flush<V: CacheObject>(index: &mut Index<V>, backing: Option<&Backing>) -> Result<usize> {
    let Some(backing) = backing else {
        return Ok(0);
    };
    let records = index
        .iter()
        .map(|(key, slot)| Ok((key.clone(), codec::encode(&slot.value)?)))
        .collect::<Result<Vec<_>>>()?;
    backing.write_batch(&records)?;
    index.mark_all_clean();
    Ok(records.len())
}
