//! RelayCraft Cache Storage
//!
//! Capacity-bounded key/value cache with optional durable backing.
//!
//! - Memory index with least-recently-used eviction
//! - Write-through to a redb database unless the store is ephemeral
//! - Sealed values refuse normal overwrites
//! - Lock-free bulk write and flush entry points for startup migration
//!
//! Persisted records carry a versioned envelope (see [`codec`]); a store
//! whose records predate the envelope must be migrated before it can be
//! opened for traffic.

pub mod codec;
mod index;
mod iterator;
mod storage;

pub use iterator::{CacheIterator, RawEntry};
pub use relaycraft_core::CacheObject;
pub use storage::{CacheOptions, CacheStorage};

use thiserror::Error;

/// Store format written by this version (versioned record envelope)
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Store format of untagged records written before the envelope existed
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Record is not in the current encoding")]
    LegacyEncoding,

    #[error("Entry {0} is sealed")]
    Sealed(String),

    #[error("Store requires migration: schema version {found}, required {required}")]
    MigrationRequired { found: u32, required: u32 },

    #[error("Store schema version {found} is newer than supported {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Lift any redb error type into [`CacheError::Database`]
pub(crate) fn db_err<E: Into<redb::Error>>(err: E) -> CacheError {
    CacheError::Database(err.into())
}
