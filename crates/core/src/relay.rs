use std::collections::BTreeMap;

use relaycraft_crypto::{hash, is_valid_public_key, sign_data, verify_signature, SigningKeypair};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{Address, CoreError, PublicKey, Result, SessionHeader, Signature, Validator};

/// The only application token version this node accepts
pub const SUPPORTED_TOKEN_VERSION: &str = "0.0.1";

/// Append a length-prefixed byte string to `data`
fn put_bytes(data: &mut Vec<u8>, bytes: &[u8]) {
    data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(bytes);
}

/// Application authentication token.
///
/// Issued by a staked application to a client; the application signs
/// the token hash to delegate its relay allowance to `client_public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aat {
    pub version: String,
    pub application_public_key: PublicKey,
    pub client_public_key: PublicKey,
    #[serde(with = "BigArray")]
    pub application_signature: Signature,
}

impl Aat {
    /// SHA-256 over version || application key || client key (signature excluded)
    pub fn hash(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(4 + self.version.len() + 32 + 32);
        put_bytes(&mut data, self.version.as_bytes());
        data.extend_from_slice(&self.application_public_key);
        data.extend_from_slice(&self.client_public_key);
        hash(&data)
    }

    /// Issue a token signed by the application key
    pub fn issue(application: &SigningKeypair, client_public_key: PublicKey) -> Self {
        let mut token = Self {
            version: SUPPORTED_TOKEN_VERSION.to_string(),
            application_public_key: application.public_key_bytes(),
            client_public_key,
            application_signature: [0u8; 64],
        };
        token.application_signature = sign_data(application, &token.hash());
        token
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != SUPPORTED_TOKEN_VERSION {
            return Err(CoreError::UnsupportedTokenVersion(self.version.clone()));
        }
        if !is_valid_public_key(&self.application_public_key)
            || !is_valid_public_key(&self.client_public_key)
        {
            return Err(CoreError::InvalidPublicKey);
        }
        if !verify_signature(
            &self.application_public_key,
            &self.hash(),
            &self.application_signature,
        ) {
            return Err(CoreError::InvalidApplicationSignature);
        }
        Ok(())
    }
}

/// Client-signed proof of a single relay.
///
/// `entropy` is a client-chosen nonce; evidence buckets deduplicate on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProof {
    pub entropy: u64,
    pub session_block_height: u64,
    pub servicer_public_key: PublicKey,
    pub chain: String,
    pub token: Aat,
    #[serde(with = "BigArray")]
    pub signature: Signature,
    pub request_hash: [u8; 32],
}

impl RelayProof {
    /// Bytes the client signs (its own signature excluded):
    /// entropy_le(8) || height_le(8) || servicer(32) || chain(len-prefixed) || token_hash(32) || request_hash(32)
    pub fn signable_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + 8 + 32 + 4 + self.chain.len() + 32 + 32);
        data.extend_from_slice(&self.entropy.to_le_bytes());
        data.extend_from_slice(&self.session_block_height.to_le_bytes());
        data.extend_from_slice(&self.servicer_public_key);
        put_bytes(&mut data, self.chain.as_bytes());
        data.extend_from_slice(&self.token.hash());
        data.extend_from_slice(&self.request_hash);
        data
    }

    /// Hash the client signs
    pub fn signable_hash(&self) -> [u8; 32] {
        hash(&self.signable_data())
    }

    /// Hash of the complete proof, signature included
    pub fn hash(&self) -> [u8; 32] {
        let mut data = self.signable_data();
        data.extend_from_slice(&self.signature);
        hash(&data)
    }

    /// Sign with the client key named in the token
    pub fn sign(&mut self, client: &SigningKeypair) {
        self.signature = sign_data(client, &self.signable_hash());
    }

    /// The session this proof claims to belong to
    pub fn session_header(&self) -> SessionHeader {
        SessionHeader::new(
            self.token.application_public_key,
            self.chain.clone(),
            self.session_block_height,
        )
    }

    pub fn servicer_address(&self) -> Address {
        Address::from_public_key(&self.servicer_public_key)
    }

    /// Token validity plus the client signature over the proof
    pub fn validate_signatures(&self) -> Result<()> {
        self.token.validate()?;
        if !verify_signature(
            &self.token.client_public_key,
            &self.signable_hash(),
            &self.signature,
        ) {
            return Err(CoreError::InvalidClientSignature);
        }
        Ok(())
    }
}

/// Request body forwarded to the hosted chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelayPayload {
    pub data: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Client view of the chain when the relay was built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelayMeta {
    pub block_height: u64,
}

/// A client request routed through a servicer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub payload: RelayPayload,
    pub meta: RelayMeta,
    pub proof: RelayProof,
}

impl Relay {
    /// SHA-256 over the payload and meta; must equal `proof.request_hash`
    pub fn request_hash(payload: &RelayPayload, meta: &RelayMeta) -> [u8; 32] {
        let mut data = Vec::new();
        put_bytes(&mut data, payload.data.as_bytes());
        put_bytes(&mut data, payload.method.as_bytes());
        put_bytes(&mut data, payload.path.as_bytes());
        data.extend_from_slice(&(payload.headers.len() as u32).to_le_bytes());
        for (key, value) in &payload.headers {
            put_bytes(&mut data, key.as_bytes());
            put_bytes(&mut data, value.as_bytes());
        }
        data.extend_from_slice(&meta.block_height.to_le_bytes());
        hash(&data)
    }

    pub fn validate_request_hash(&self) -> Result<()> {
        if self.payload.data.is_empty() && self.payload.path.is_empty() {
            return Err(CoreError::EmptyPayload);
        }
        if Self::request_hash(&self.payload, &self.meta) != self.proof.request_hash {
            return Err(CoreError::RequestHashMismatch);
        }
        Ok(())
    }
}

/// Servicer-signed response to a relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    #[serde(with = "BigArray")]
    pub signature: Signature,
    pub response: String,
    pub proof: RelayProof,
}

impl RelayResponse {
    /// SHA-256(response(len-prefixed) || proof hash); the servicer signs this
    pub fn hash(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(4 + self.response.len() + 32);
        put_bytes(&mut data, self.response.as_bytes());
        data.extend_from_slice(&self.proof.hash());
        hash(&data)
    }

    pub fn hash_string(&self) -> String {
        hex::encode(self.hash())
    }

    /// Check the servicer signature against the key named in the proof
    pub fn verify_signature(&self) -> bool {
        verify_signature(&self.proof.servicer_public_key, &self.hash(), &self.signature)
    }
}

/// A client's claim that a minority of servicers returned divergent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeProofInvalidData {
    pub majority_responses: Vec<RelayResponse>,
    pub minority_response: RelayResponse,
    pub reporter_address: Address,
}

impl ChallengeProofInvalidData {
    /// Session header reconstructed from the disputed proof
    pub fn session_header(&self) -> SessionHeader {
        self.minority_response.proof.session_header()
    }

    pub fn hash(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(32 * (self.majority_responses.len() + 1) + 20);
        for response in &self.majority_responses {
            data.extend_from_slice(&response.hash());
        }
        data.extend_from_slice(&self.minority_response.hash());
        data.extend_from_slice(self.reporter_address.as_bytes());
        hash(&data)
    }
}

/// Confirmation returned for an accepted challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub response: String,
}

/// Session as handed to clients by dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSession {
    pub header: SessionHeader,
    pub session_key: [u8; 32],
    pub session_nodes: Vec<Validator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub session: DispatchSession,
    pub block_height: u64,
}
