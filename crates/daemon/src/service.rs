//! Node service

use std::sync::Arc;

use relaycraft_cache::{CacheOptions, CacheStorage};
use relaycraft_core::{
    ChainExecutor, ConsensusContext, Evidence, Receipt, ServiceMetrics, StakeLedger,
};
use relaycraft_evidence::{migrate_legacy_evidence, MigrationReport};
use relaycraft_keystore::load_signing_keypairs;
use relaycraft_registry::{CacheConfig, HostedBlockchains, NodeRegistry, RegistryMode};
use relaycraft_relay::{HttpChainExecutor, Querier, RelayService, ServiceConfig};
use relaycraft_settings::{load_hosted_chains, NodeSettings, Settings};
use tracing::{debug, error, info};

use crate::{DaemonError, Result};

/// What the node consumes from the rest of the validator
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn StakeLedger>,
    pub consensus: Arc<dyn ConsensusContext>,
    pub metrics: Arc<dyn ServiceMetrics>,
}

pub fn cache_config(node: &NodeSettings) -> CacheConfig {
    CacheConfig {
        data_dir: node.data_path(),
        evidence_db_name: node.evidence_db_name.clone(),
        max_evidence_entries: node.max_evidence_cache_entries,
        max_session_entries: node.max_session_cache_entries,
        options: CacheOptions::default(),
    }
}

/// Registry holding every configured servicer key
pub fn load_registry(node: &NodeSettings) -> Result<Arc<NodeRegistry>> {
    let keypairs = load_signing_keypairs(&node.keyfile_paths())?;
    if keypairs.is_empty() {
        return Err(DaemonError::NoIdentities);
    }
    let registry = NodeRegistry::new(RegistryMode { lean: node.lean });
    for keypair in keypairs {
        registry.add_identity(keypair);
    }
    Ok(Arc::new(registry))
}

pub fn load_hosted_blockchains(node: &NodeSettings) -> Result<HostedBlockchains> {
    match node.hosted_chains_file() {
        Some(path) => Ok(HostedBlockchains::new(load_hosted_chains(&path)?)),
        None => {
            debug!("No hosted chains file configured");
            Ok(HostedBlockchains::default())
        }
    }
}

/// Upgrade every existing evidence database the registry will open.
///
/// Must run before the stores are opened for traffic. Databases that do
/// not exist yet are skipped.
pub fn migrate_evidence(
    registry: &NodeRegistry,
    config: &CacheConfig,
) -> Result<Vec<(String, MigrationReport)>> {
    let mut reports = Vec::new();
    for (address, db) in registry.evidence_db_names(config) {
        if !config.data_dir.join(&db).exists() {
            debug!("No evidence database {} for servicer {}", db, address);
            continue;
        }
        let mut store: CacheStorage<Evidence> = CacheStorage::open_for_migration(
            &config.data_dir,
            &db,
            &config.options,
            config.max_evidence_entries,
        )?;
        let report = migrate_legacy_evidence(&mut store).map_err(|source| DaemonError::Migration {
            db: db.clone(),
            source,
        })?;
        if !report.is_noop() {
            info!(
                "Evidence database {} migrated from schema {} to {}",
                db, report.from_version, report.to_version
            );
        }
        reports.push((db, report));
    }
    Ok(reports)
}

/// Receipts for every identity with open stores
pub fn stored_receipts(registry: &NodeRegistry) -> Result<Vec<Receipt>> {
    let mut receipts = Vec::new();
    for node in registry.nodes() {
        let Some(caches) = node.caches() else {
            continue;
        };
        for evidence in caches.evidence.all_evidence()? {
            receipts.push(Receipt {
                header: evidence.header,
                servicer_address: node.address(),
                evidence_type: evidence.evidence_type,
                total: evidence.count,
            });
        }
    }
    Ok(receipts)
}

/// A running servicer node
pub struct NodeService {
    registry: Arc<NodeRegistry>,
    service: Arc<RelayService>,
    querier: Querier,
    migrations: Vec<(String, MigrationReport)>,
}

impl NodeService {
    /// Start with the HTTP executor for hosted chains
    pub fn start(settings: &Settings, collaborators: Collaborators) -> Result<Self> {
        let executor = HttpChainExecutor::with_timeout_ms(settings.node.effective_rpc_timeout_ms())?;
        Self::start_with_executor(settings, collaborators, Arc::new(executor))
    }

    pub fn start_with_executor(
        settings: &Settings,
        collaborators: Collaborators,
        executor: Arc<dyn ChainExecutor>,
    ) -> Result<Self> {
        let node = &settings.node;
        let registry = load_registry(node)?;
        let config = cache_config(node);

        let migrations = migrate_evidence(&registry, &config)?;
        let opened = registry.init_all_caches(&config)?;
        let hosted = Arc::new(load_hosted_blockchains(node)?);

        let service_config = ServiceConfig {
            relay_errors: node.relay_errors,
            client_session_sync_allowance: node.client_session_sync_allowance,
            cache: config,
        };
        let service = Arc::new(RelayService::new(
            Arc::clone(&registry),
            Arc::clone(&hosted),
            collaborators.ledger,
            collaborators.consensus,
            executor,
            collaborators.metrics,
            service_config,
        ));

        info!(
            "Servicer node started: {} identities, {} with stores, {} hosted chains, lean={}",
            registry.len(),
            opened,
            hosted.len(),
            node.lean
        );

        Ok(Self {
            registry,
            querier: Querier::new(Arc::clone(&service)),
            service,
            migrations,
        })
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn service(&self) -> &Arc<RelayService> {
        &self.service
    }

    pub fn querier(&self) -> &Querier {
        &self.querier
    }

    /// Migrations run at startup, by database name
    pub fn migrations(&self) -> &[(String, MigrationReport)] {
        &self.migrations
    }

    /// Flush every identity's stores
    pub fn shutdown(&self) -> Result<()> {
        info!("Flushing servicer stores");
        match self.registry.flush_all() {
            0 => Ok(()),
            failures => {
                error!("{} stores failed to flush on shutdown", failures);
                Err(DaemonError::FlushFailed(failures))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycraft_core::{
        Address, Application, BlockHash, ContextError, EvidenceType, NoopMetrics, Parameters,
        PublicKey, SessionHeader, Validator,
    };
    use relaycraft_evidence::EvidenceStore;
    use tempfile::TempDir;

    struct EmptyLedger;

    impl StakeLedger for EmptyLedger {
        fn validators_for_chain(&self, _height: u64, _chain: &str) -> Vec<Validator> {
            Vec::new()
        }

        fn validator(&self, _height: u64, _address: &Address) -> Option<Validator> {
            None
        }

        fn application(&self, _height: u64, _public_key: &PublicKey) -> Option<Application> {
            None
        }

        fn blocks_per_session(&self, _height: u64) -> u64 {
            4
        }

        fn session_node_count(&self, _height: u64) -> u64 {
            5
        }

        fn supported_blockchains(&self, _height: u64) -> Vec<String> {
            vec!["0001".to_string()]
        }

        fn parameters(&self, _height: u64) -> Parameters {
            Parameters {
                session_node_count: 5,
                claim_submission_window: 3,
                supported_blockchains: self.supported_blockchains(0),
                claim_expiration: 100,
                minimum_number_of_proofs: 10,
            }
        }
    }

    struct FixedConsensus;

    impl ConsensusContext for FixedConsensus {
        fn current_height(&self) -> u64 {
            6
        }

        fn block_hash(&self, height: u64) -> std::result::Result<BlockHash, ContextError> {
            Ok([height as u8; 32])
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            ledger: Arc::new(EmptyLedger),
            consensus: Arc::new(FixedConsensus),
            metrics: Arc::new(NoopMetrics),
        }
    }

    fn settings(dir: &TempDir, keys: usize, lean: bool) -> Settings {
        let mut settings = Settings::default();
        settings.node.data_dir = dir.path().join("data").to_string_lossy().into_owned();
        settings.node.lean = lean;
        settings.node.keyfiles = (0..keys)
            .map(|i| dir.path().join(format!("keys/{}.key", i)).to_string_lossy().into_owned())
            .collect();
        settings
    }

    #[test]
    fn test_start_lean_opens_every_identity() {
        let dir = TempDir::new().unwrap();
        let node = NodeService::start(&settings(&dir, 2, true), collaborators()).unwrap();

        assert_eq!(node.registry().len(), 2);
        for servicer in node.registry().nodes() {
            assert!(servicer.caches().is_some());
        }
        assert!(node.migrations().is_empty());
        node.shutdown().unwrap();
    }

    #[test]
    fn test_start_legacy_binds_one_identity() {
        let dir = TempDir::new().unwrap();
        let node = NodeService::start(&settings(&dir, 2, false), collaborators()).unwrap();

        let with_stores = node
            .registry()
            .nodes()
            .iter()
            .filter(|n| n.caches().is_some())
            .count();
        assert_eq!(with_stores, 1);
        assert!(node.registry().legacy_caches().is_some());
    }

    #[test]
    fn test_restart_keeps_identities_and_evidence() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, 1, true);
        let header = SessionHeader::new([9u8; 32], "0001", 5);

        let first = NodeService::start(&settings, collaborators()).unwrap();
        let address = first.registry().addresses()[0];
        let caches = first.registry().resolve(&address).unwrap().caches().unwrap().clone();
        let evidence = caches.evidence.get_evidence(&header, EvidenceType::Relay, 10).unwrap();
        assert!(evidence.is_empty());
        first.shutdown().unwrap();
        drop(caches);
        drop(first);

        let second = NodeService::start(&settings, collaborators()).unwrap();
        assert_eq!(second.registry().addresses(), vec![address]);
        // Existing database is already current
        assert_eq!(second.migrations().len(), 1);
        assert!(second.migrations()[0].1.is_noop());
    }

    #[test]
    fn test_stored_receipts_empty() {
        let dir = TempDir::new().unwrap();
        let node = NodeService::start(&settings(&dir, 1, true), collaborators()).unwrap();
        assert!(stored_receipts(node.registry()).unwrap().is_empty());
    }

    #[test]
    fn test_migrate_skips_missing_databases() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir, 2, true);
        let registry = load_registry(&settings.node).unwrap();
        let config = cache_config(&settings.node);
        assert!(migrate_evidence(&registry, &config).unwrap().is_empty());

        // A database created by a previous run is visited
        let (_, db) = registry.evidence_db_names(&config)[0].clone();
        drop(EvidenceStore::open(&config.data_dir, &db, &config.options, 10).unwrap());
        let reports = migrate_evidence(&registry, &config).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, db);
    }

    #[test]
    fn test_missing_hosted_chains_file_fails() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir, 1, true);
        settings.node.hosted_chains_path = Some(dir.path().join("chains.json").to_string_lossy().into_owned());
        assert!(matches!(
            NodeService::start(&settings, collaborators()),
            Err(DaemonError::Settings(_))
        ));
    }
}
