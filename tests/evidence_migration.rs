//! Legacy evidence upgrade at node startup
//!
//! A node whose evidence database was written in the legacy encoding must
//! refuse to open it for traffic, upgrade it on start, and serve the
//! migrated proofs afterwards.

use std::sync::Arc;

use relaycraft_cache::{CacheError, CacheOptions, CacheStorage, CURRENT_SCHEMA_VERSION};
use relaycraft_core::{
    Aat, Address, Application, BlockHash, ConsensusContext, ContextError, Evidence, EvidenceType,
    NoopMetrics, Parameters, Proof, PublicKey, RelayProof, SessionHeader, StakeLedger, Validator,
};
use relaycraft_crypto::SigningKeypair;
use relaycraft_daemon::{cache_config, load_registry, Collaborators, DaemonError, NodeService};
use relaycraft_evidence::{
    legacy_evidence_key, EvidenceError, EvidenceStore, LegacyEvidence, LegacySessionHeader,
};
use relaycraft_keystore::save_keypair_bytes;
use relaycraft_settings::Settings;
use tempfile::TempDir;

struct QuietLedger;

impl StakeLedger for QuietLedger {
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
        Vec::new()
    }

    fn parameters(&self, _height: u64) -> Parameters {
        Parameters {
            session_node_count: 5,
            claim_submission_window: 3,
            supported_blockchains: Vec::new(),
            claim_expiration: 24,
            minimum_number_of_proofs: 10,
        }
    }
}

struct Genesis;

impl ConsensusContext for Genesis {
    fn current_height(&self) -> u64 {
        1
    }

    fn block_hash(&self, _height: u64) -> Result<BlockHash, ContextError> {
        Ok([0u8; 32])
    }
}

fn collaborators() -> Collaborators {
    Collaborators {
        ledger: Arc::new(QuietLedger),
        consensus: Arc::new(Genesis),
        metrics: Arc::new(NoopMetrics),
    }
}

fn proof(entropy: u64, servicer: &SigningKeypair) -> Proof {
    let app = SigningKeypair::from_secret_bytes(&[1u8; 32]);
    let client = SigningKeypair::from_secret_bytes(&[3u8; 32]);
    Proof::Relay(RelayProof {
        entropy,
        session_block_height: 5,
        servicer_public_key: servicer.public_key_bytes(),
        chain: "0001".to_string(),
        token: Aat::issue(&app, client.public_key_bytes()),
        signature: [0u8; 64],
        request_hash: [0u8; 32],
    })
}

fn legacy_record(servicer: &SigningKeypair, entropies: &[u64]) -> LegacyEvidence {
    let app = SigningKeypair::from_secret_bytes(&[1u8; 32]);
    LegacyEvidence {
        header: LegacySessionHeader {
            application_public_key: hex::encode(app.public_key_bytes()),
            chain: "0001".to_string(),
            session_block_height: 5,
        },
        evidence_type: EvidenceType::Relay.tag(),
        proofs: entropies.iter().map(|e| proof(*e, servicer)).collect(),
        num_of_proofs: entropies.len() as i64,
    }
}

/// Legacy-mode node with one key and a legacy evidence database
fn legacy_node(dir: &TempDir, records: &[LegacyEvidence], servicer: &SigningKeypair) -> Settings {
    let key_path = dir.path().join("servicer.key");
    save_keypair_bytes(&key_path, &servicer.secret_key_bytes()).unwrap();

    let mut settings = Settings::default();
    settings.node.lean = false;
    settings.node.data_dir = dir.path().join("data").to_string_lossy().into_owned();
    settings.node.keyfiles = vec![key_path.to_string_lossy().into_owned()];

    let config = cache_config(&settings.node);
    let mut store = CacheStorage::<Evidence>::open_for_migration(
        &config.data_dir,
        &config.evidence_db_name,
        &CacheOptions::default(),
        16,
    )
    .unwrap();
    for record in records {
        let bytes = bincode::serialize(record).unwrap();
        store
            .insert_raw_without_lock(&legacy_evidence_key(record), &bytes)
            .unwrap();
    }
    settings
}

#[test]
fn test_legacy_database_refuses_traffic_until_migrated() {
    let dir = TempDir::new().unwrap();
    let servicer = SigningKeypair::generate();
    let settings = legacy_node(&dir, &[legacy_record(&servicer, &[1, 2])], &servicer);

    let config = cache_config(&settings.node);
    let registry = load_registry(&settings.node).unwrap();
    let result = EvidenceStore::open(&config.data_dir, &config.evidence_db_name, &config.options, 16);
    assert!(matches!(
        result,
        Err(EvidenceError::Cache(CacheError::MigrationRequired { .. }))
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_startup_migrates_and_serves_proofs() {
    let dir = TempDir::new().unwrap();
    let servicer = SigningKeypair::generate();
    let settings = legacy_node(&dir, &[legacy_record(&servicer, &[1, 2, 3])], &servicer);

    let node = NodeService::start(&settings, collaborators()).unwrap();
    let migrations = node.migrations();
    assert_eq!(migrations.len(), 1);
    assert_eq!(migrations[0].0, "evidence");
    assert_eq!(migrations[0].1.upgraded, 1);
    assert_eq!(migrations[0].1.to_version, CURRENT_SCHEMA_VERSION);

    let app = SigningKeypair::from_secret_bytes(&[1u8; 32]);
    let header = SessionHeader::new(app.public_key_bytes(), "0001", 5);
    let address = node.registry().addresses()[0];
    let receipt = node
        .service()
        .receipt(&address, &header, EvidenceType::Relay)
        .unwrap()
        .unwrap();
    assert_eq!(receipt.total, 3);
    node.shutdown().unwrap();
    drop(node);

    // Second start finds nothing to do
    let node = NodeService::start(&settings, collaborators()).unwrap();
    assert!(node.migrations()[0].1.is_noop());
}

#[test]
fn test_corrupt_legacy_record_aborts_startup() {
    let dir = TempDir::new().unwrap();
    let servicer = SigningKeypair::generate();
    let settings = legacy_node(&dir, &[], &servicer);

    let config = cache_config(&settings.node);
    {
        let mut store = CacheStorage::<Evidence>::open_for_migration(
            &config.data_dir,
            &config.evidence_db_name,
            &CacheOptions::default(),
            16,
        )
        .unwrap();
        store.insert_raw_without_lock("deadbeef", b"not bincode").unwrap();
    }

    assert!(matches!(
        NodeService::start(&settings, collaborators()),
        Err(DaemonError::Migration { .. })
    ));
}
