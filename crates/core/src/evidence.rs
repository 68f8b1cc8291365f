use serde::{Deserialize, Serialize};

use crate::{Address, CacheObject, ChallengeProofInvalidData, RelayProof, SessionHeader};

/// Kind of work recorded in an evidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceType {
    Relay,
    Challenge,
}

impl EvidenceType {
    /// Single-byte tag used in persisted keys
    pub fn tag(&self) -> u8 {
        match self {
            EvidenceType::Relay => 1,
            EvidenceType::Challenge => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EvidenceType::Relay),
            2 => Some(EvidenceType::Challenge),
            _ => None,
        }
    }
}

/// One unit of claimed work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Proof {
    Relay(RelayProof),
    Challenge(ChallengeProofInvalidData),
}

impl Proof {
    /// Client-chosen nonce; the dedup key inside a bucket.
    ///
    /// Challenges dedup on the disputed (minority) proof.
    pub fn entropy(&self) -> u64 {
        match self {
            Proof::Relay(proof) => proof.entropy,
            Proof::Challenge(challenge) => challenge.minority_response.proof.entropy,
        }
    }

    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            Proof::Relay(_) => EvidenceType::Relay,
            Proof::Challenge(_) => EvidenceType::Challenge,
        }
    }

    pub fn session_header(&self) -> SessionHeader {
        match self {
            Proof::Relay(proof) => proof.session_header(),
            Proof::Challenge(challenge) => challenge.session_header(),
        }
    }

    pub fn chain(&self) -> &str {
        match self {
            Proof::Relay(proof) => &proof.chain,
            Proof::Challenge(challenge) => &challenge.minority_response.proof.chain,
        }
    }
}

impl From<RelayProof> for Proof {
    fn from(proof: RelayProof) -> Self {
        Proof::Relay(proof)
    }
}

impl From<ChallengeProofInvalidData> for Proof {
    fn from(challenge: ChallengeProofInvalidData) -> Self {
        Proof::Challenge(challenge)
    }
}

/// Accepted proofs for one (session header, evidence type) bucket.
///
/// Grows until sealed for a claim or deleted after settlement. No two
/// proofs share an entropy value and `count` never passes the cap it
/// was inserted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub header: SessionHeader,
    pub evidence_type: EvidenceType,
    pub proofs: Vec<Proof>,
    pub count: u64,
    /// Cap in force when the bucket was created
    pub max_proofs: u64,
    pub sealed: bool,
}

impl Evidence {
    pub fn new(header: SessionHeader, evidence_type: EvidenceType, max_proofs: u64) -> Self {
        Self {
            header,
            evidence_type,
            proofs: Vec::new(),
            count: 0,
            max_proofs,
            sealed: false,
        }
    }

    /// True iff no stored proof has the same entropy
    pub fn is_unique(&self, proof: &Proof) -> bool {
        let entropy = proof.entropy();
        !self.proofs.iter().any(|p| p.entropy() == entropy)
    }

    /// Append without checks; callers enforce uniqueness and the cap
    pub fn add_proof(&mut self, proof: Proof) {
        self.proofs.push(proof);
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }
}

impl CacheObject for Evidence {
    fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// Query-surface view of a recorded evidence bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub header: SessionHeader,
    pub servicer_address: Address,
    pub evidence_type: EvidenceType,
    pub total: u64,
}
