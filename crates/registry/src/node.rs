use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use relaycraft_cache::CacheOptions;
use relaycraft_core::{Address, PublicKey, Signature};
use relaycraft_crypto::{sign_data, SigningKeypair};
use relaycraft_evidence::EvidenceStore;
use relaycraft_session::SessionStore;
use tracing::info;

use crate::Result;

/// Where and how big the per-identity stores are
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub data_dir: PathBuf,
    pub evidence_db_name: String,
    pub max_evidence_entries: usize,
    pub max_session_entries: usize,
    pub options: CacheOptions,
}

impl CacheConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            evidence_db_name: "evidence".to_string(),
            max_evidence_entries: 500,
            max_session_entries: 500,
            options: CacheOptions::default(),
        }
    }
}

/// Stores owned by one identity. Clones share the same instances.
#[derive(Clone)]
pub struct NodeCaches {
    pub evidence: Arc<EvidenceStore>,
    pub sessions: Arc<SessionStore>,
}

impl NodeCaches {
    /// Open the stores; `evidence_db_name` is the final database name
    pub(crate) fn open(config: &CacheConfig, evidence_db_name: &str) -> Result<Self> {
        let evidence = EvidenceStore::open(
            &config.data_dir,
            evidence_db_name,
            &config.options,
            config.max_evidence_entries,
        )?;
        Ok(Self {
            evidence: Arc::new(evidence),
            sessions: Arc::new(SessionStore::ephemeral(config.max_session_entries)),
        })
    }

    pub fn same_as(&self, other: &NodeCaches) -> bool {
        Arc::ptr_eq(&self.evidence, &other.evidence) && Arc::ptr_eq(&self.sessions, &other.sessions)
    }
}

/// A servicer identity hosted by this process
pub struct ServicerNode {
    keypair: SigningKeypair,
    address: Address,
    caches: OnceCell<NodeCaches>,
}

impl ServicerNode {
    pub fn new(keypair: SigningKeypair) -> Self {
        let address = Address::from_public_key(&keypair.public_key_bytes());
        Self {
            keypair,
            address,
            caches: OnceCell::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key_bytes()
    }

    pub fn keypair(&self) -> &SigningKeypair {
        &self.keypair
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        sign_data(&self.keypair, data)
    }

    /// Stores, if already initialised
    pub fn caches(&self) -> Option<&NodeCaches> {
        self.caches.get()
    }

    /// Initialise the stores at most once; later calls return the same ones
    pub(crate) fn init_caches(&self, config: &CacheConfig, evidence_db_name: &str) -> Result<&NodeCaches> {
        self.caches.get_or_try_init(|| {
            let caches = NodeCaches::open(config, evidence_db_name)?;
            info!(
                "Initialised stores for servicer {} (evidence db {})",
                self.address, evidence_db_name
            );
            Ok(caches)
        })
    }
}

impl std::fmt::Debug for ServicerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicerNode")
            .field("address", &self.address)
            .field("caches_initialised", &self.caches.get().is_some())
            .finish()
    }
}
