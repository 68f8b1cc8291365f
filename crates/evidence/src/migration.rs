//! Upgrade of evidence stores written before the versioned record envelope.
//!
//! Legacy records are bare bincode of [`LegacyEvidence`] keyed by
//! hex(SHA-256(legacy header) || kind tag). Each one is converted, re-keyed
//! and written back in the current encoding; the schema version is bumped
//! last so an interrupted run is simply repeated.

use relaycraft_cache::{CacheStorage, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};
use relaycraft_core::{Evidence, EvidenceType, Proof, SessionHeader};
use relaycraft_crypto::hash;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{evidence_key, EvidenceError, Result};

/// Session header as persisted by older nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySessionHeader {
    /// Hex-encoded application public key
    pub application_public_key: String,
    pub chain: String,
    pub session_block_height: i64,
}

impl LegacySessionHeader {
    fn hash(&self) -> [u8; 32] {
        let mut data = Vec::new();
        data.extend_from_slice(self.application_public_key.as_bytes());
        data.extend_from_slice(self.chain.as_bytes());
        data.extend_from_slice(&self.session_block_height.to_be_bytes());
        hash(&data)
    }
}

/// Evidence bucket as persisted by older nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEvidence {
    pub header: LegacySessionHeader,
    pub evidence_type: u8,
    pub proofs: Vec<Proof>,
    pub num_of_proofs: i64,
}

impl LegacyEvidence {
    fn into_evidence(self, key: &str) -> Result<Evidence> {
        let decode_err = |reason: String| EvidenceError::LegacyDecode {
            key: key.to_string(),
            reason,
        };

        let app_key = hex::decode(&self.header.application_public_key).map_err(|e| decode_err(e.to_string()))?;
        let application_public_key: [u8; 32] = app_key
            .as_slice()
            .try_into()
            .map_err(|_| decode_err(format!("application key has {} bytes", app_key.len())))?;
        let session_block_height = u64::try_from(self.header.session_block_height)
            .map_err(|_| decode_err(format!("negative height {}", self.header.session_block_height)))?;
        let evidence_type = EvidenceType::from_tag(self.evidence_type)
            .ok_or_else(|| decode_err(format!("unknown evidence type {}", self.evidence_type)))?;

        let header = SessionHeader::new(application_public_key, self.header.chain, session_block_height);
        let count = self.proofs.len() as u64;
        let max_proofs = count.max(u64::try_from(self.num_of_proofs).unwrap_or(0));
        Ok(Evidence {
            header,
            evidence_type,
            proofs: self.proofs,
            count,
            max_proofs,
            sealed: false,
        })
    }
}

/// Key a legacy record was stored under
pub fn legacy_evidence_key(evidence: &LegacyEvidence) -> String {
    let mut bytes = evidence.header.hash().to_vec();
    bytes.push(evidence.evidence_type);
    hex::encode(bytes)
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub upgraded: usize,
    pub already_current: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version && self.upgraded == 0
    }
}

/// Convert every legacy record in `store` to the current encoding.
///
/// The store must be opened with `CacheStorage::open_for_migration` and not
/// shared. Any record that fails to decode aborts the run before the schema
/// version is written.
pub fn migrate_legacy_evidence(store: &mut CacheStorage<Evidence>) -> Result<MigrationReport> {
    let from_version = store.schema_version()?.unwrap_or(LEGACY_SCHEMA_VERSION);
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        ..Default::default()
    };
    if from_version >= CURRENT_SCHEMA_VERSION {
        debug!("Evidence store {} already at schema {}", store.name(), from_version);
        return Ok(report);
    }

    let entries: Vec<_> = store.iterator()?.collect();
    let mut stale_keys = Vec::new();
    for entry in entries {
        if entry.is_current() {
            report.already_current += 1;
            continue;
        }
        let legacy: LegacyEvidence =
            bincode::deserialize(&entry.bytes).map_err(|e| EvidenceError::LegacyDecode {
                key: entry.key.clone(),
                reason: e.to_string(),
            })?;
        let evidence = legacy.into_evidence(&entry.key)?;
        let key = evidence_key(&evidence.header, evidence.evidence_type);
        if key != entry.key {
            stale_keys.push(entry.key);
        }
        store.set_without_lock_and_seal_check(&key, evidence)?;
        report.upgraded += 1;
    }

    // New records are durable before the old keys go away
    store.flush_to_db_without_lock()?;
    for key in &stale_keys {
        store.delete_without_lock(key)?;
    }
    store.set_schema_version(CURRENT_SCHEMA_VERSION)?;
    report.to_version = CURRENT_SCHEMA_VERSION;

    info!(
        "Migrated evidence store {}: {} upgraded, {} already current",
        store.name(),
        report.upgraded,
        report.already_current
    );
    Ok(report)
}
