//! RelayCraft Evidence
//!
//! Per-servicer store of accepted proofs, bucketed by
//! (session header, evidence type). Proof insertion is serialized per
//! bucket so uniqueness and the cap hold under concurrent relays.

mod migration;
mod store;

pub use migration::{
    legacy_evidence_key, migrate_legacy_evidence, LegacyEvidence, LegacySessionHeader,
    MigrationReport,
};
pub use store::{evidence_key, is_unique, EvidenceStore};

use relaycraft_cache::CacheError;
use relaycraft_core::EvidenceType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Duplicate proof: entropy {entropy} already recorded")]
    DuplicateProof { entropy: u64 },

    #[error("Evidence cap of {cap} proofs reached")]
    CapExceeded { cap: u64 },

    #[error("Evidence is sealed")]
    Sealed,

    #[error("Proof is {found:?} evidence, expected {expected:?}")]
    KindMismatch {
        expected: EvidenceType,
        found: EvidenceType,
    },

    #[error("Proof does not belong to the evidence session")]
    HeaderMismatch,

    #[error("Failed to decode legacy record {key}: {reason}")]
    LegacyDecode { key: String, reason: String },

    #[error("Evidence cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, EvidenceError>;
