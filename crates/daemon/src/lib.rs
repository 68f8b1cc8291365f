//! RelayCraft Daemon
//!
//! Servicer node lifecycle around the relay core.
//!
//! ## Startup
//!
//! 1. Load (or generate) the configured servicer keys
//! 2. Register identities (lean or legacy mode)
//! 3. Migrate evidence databases written in the legacy encoding
//! 4. Open every identity's stores
//! 5. Build the relay service over the embedder's ledger and consensus
//!
//! ## Shutdown
//!
//! Every identity's stores are flushed; failures are logged and reported.

mod service;

pub use service::{
    cache_config, load_hosted_blockchains, load_registry, migrate_evidence, stored_receipts,
    Collaborators, NodeService,
};

use relaycraft_cache::CacheError;
use relaycraft_core::ExecutionError;
use relaycraft_evidence::EvidenceError;
use relaycraft_keystore::KeystoreError;
use relaycraft_registry::RegistryError;
use relaycraft_settings::SettingsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to migrate evidence database {db}: {source}")]
    Migration { db: String, source: EvidenceError },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutionError),

    #[error("No servicer keys configured")]
    NoIdentities,

    #[error("{0} stores failed to flush")]
    FlushFailed(usize),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
