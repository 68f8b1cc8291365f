use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use parking_lot::Mutex;
use relaycraft_cache::{CacheError, CacheOptions, CacheStorage};
use relaycraft_core::{Evidence, EvidenceType, Proof, SessionHeader};
use tracing::{debug, info};

use crate::{EvidenceError, Result};

/// Number of striped insertion locks
const KEY_LOCK_STRIPES: usize = 64;

/// Cache key of a bucket: hex(app key || height_be || kind tag || chain)
pub fn evidence_key(header: &SessionHeader, kind: EvidenceType) -> String {
    let mut bytes = Vec::with_capacity(32 + 8 + 1 + header.chain.len());
    bytes.extend_from_slice(&header.application_public_key);
    bytes.extend_from_slice(&header.session_block_height.to_be_bytes());
    bytes.push(kind.tag());
    bytes.extend_from_slice(header.chain.as_bytes());
    hex::encode(bytes)
}

/// True iff `evidence` holds no proof with the same entropy
pub fn is_unique(proof: &Proof, evidence: &Evidence) -> bool {
    evidence.is_unique(proof)
}

/// Evidence buckets of one servicer identity
pub struct EvidenceStore {
    cache: CacheStorage<Evidence>,
    key_locks: Vec<Mutex<()>>,
}

impl EvidenceStore {
    pub fn new(cache: CacheStorage<Evidence>) -> Self {
        Self {
            cache,
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Open a durable store at `path/name`
    pub fn open(path: impl AsRef<Path>, name: &str, options: &CacheOptions, max_entries: usize) -> Result<Self> {
        let cache = CacheStorage::init(path, name, options, max_entries, false)?;
        Ok(Self::new(cache))
    }

    pub fn ephemeral(max_entries: usize) -> Self {
        Self::new(CacheStorage::ephemeral("evidence", max_entries))
    }

    fn key_lock(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.key_locks[(hasher.finish() as usize) % self.key_locks.len()]
    }

    /// Bucket for (header, kind); an empty one if nothing is stored
    pub fn get_evidence(&self, header: &SessionHeader, kind: EvidenceType, max_proofs: u64) -> Result<Evidence> {
        let key = evidence_key(header, kind);
        Ok(self
            .cache
            .get(&key)?
            .unwrap_or_else(|| Evidence::new(header.clone(), kind, max_proofs)))
    }

    /// Append a proof to its bucket and persist it.
    ///
    /// Rejects duplicates (same entropy), a full bucket (`count >= max_proofs`)
    /// and sealed buckets. Returns the updated bucket.
    pub fn set_proof(
        &self,
        header: &SessionHeader,
        kind: EvidenceType,
        proof: Proof,
        max_proofs: u64,
    ) -> Result<Evidence> {
        if proof.evidence_type() != kind {
            return Err(EvidenceError::KindMismatch {
                expected: kind,
                found: proof.evidence_type(),
            });
        }
        if &proof.session_header() != header {
            return Err(EvidenceError::HeaderMismatch);
        }

        let key = evidence_key(header, kind);
        let _guard = self.key_lock(&key).lock();

        let mut evidence = self
            .cache
            .get(&key)?
            .unwrap_or_else(|| Evidence::new(header.clone(), kind, max_proofs));
        if evidence.sealed {
            return Err(EvidenceError::Sealed);
        }
        if !evidence.is_unique(&proof) {
            return Err(EvidenceError::DuplicateProof {
                entropy: proof.entropy(),
            });
        }
        if evidence.count >= max_proofs {
            return Err(EvidenceError::CapExceeded { cap: max_proofs });
        }

        evidence.add_proof(proof);
        match self.cache.set(&key, evidence.clone()) {
            Ok(()) => Ok(evidence),
            Err(CacheError::Sealed(_)) => Err(EvidenceError::Sealed),
            Err(e) => Err(e.into()),
        }
    }

    /// Bucket plus its proof count
    pub fn get_total_proofs(
        &self,
        header: &SessionHeader,
        kind: EvidenceType,
        max_proofs: u64,
    ) -> Result<(Evidence, u64)> {
        let evidence = self.get_evidence(header, kind, max_proofs)?;
        let total = evidence.count;
        Ok((evidence, total))
    }

    /// Proof at `index` in insertion order
    pub fn get_proof(&self, header: &SessionHeader, kind: EvidenceType, index: usize) -> Result<Option<Proof>> {
        let key = evidence_key(header, kind);
        Ok(self
            .cache
            .get(&key)?
            .and_then(|evidence| evidence.proofs.get(index).cloned()))
    }

    pub fn delete_evidence(&self, header: &SessionHeader, kind: EvidenceType) -> Result<()> {
        let key = evidence_key(header, kind);
        let _guard = self.key_lock(&key).lock();
        self.cache.delete(&key)?;
        debug!(
            "Deleted {:?} evidence for chain {} at height {}",
            kind, header.chain, header.session_block_height
        );
        Ok(())
    }

    /// Freeze a bucket for claiming; returns it, or None if absent
    pub fn seal_evidence(&self, header: &SessionHeader, kind: EvidenceType) -> Result<Option<Evidence>> {
        let key = evidence_key(header, kind);
        let _guard = self.key_lock(&key).lock();
        let Some(mut evidence) = self.cache.get(&key)? else {
            return Ok(None);
        };
        if evidence.sealed {
            return Ok(Some(evidence));
        }
        evidence.seal();
        self.cache.set(&key, evidence.clone())?;
        info!(
            "Sealed {:?} evidence for chain {} at height {} ({} proofs)",
            kind, header.chain, header.session_block_height, evidence.count
        );
        Ok(Some(evidence))
    }

    /// Every stored bucket, in key order
    pub fn all_evidence(&self) -> Result<Vec<Evidence>> {
        self.cache
            .iterator()?
            .map(|entry| entry.value::<Evidence>().map_err(EvidenceError::from))
            .collect()
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.cache.flush_to_db()?)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.cache.is_ephemeral()
    }
}
