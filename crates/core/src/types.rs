use std::fmt;
use std::str::FromStr;

use relaycraft_crypto::{address_from_public_key, ADDRESS_LENGTH};
use serde::{Deserialize, Serialize};

use crate::{CacheObject, CoreError, Result};

/// 32-byte public key
pub type PublicKey = [u8; 32];

/// 64-byte signature (use BigArray for serde support)
pub type Signature = [u8; 64];

/// 32-byte block hash supplied by consensus
pub type BlockHash = [u8; 32];

/// Validator address: first 20 bytes of SHA-256(public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub fn from_public_key(pubkey: &PublicKey) -> Self {
        Self(address_from_public_key(pubkey))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// Identity of a session: (application, chain, session start height).
///
/// Also the scope of an evidence bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHeader {
    pub application_public_key: PublicKey,
    pub chain: String,
    pub session_block_height: u64,
}

impl SessionHeader {
    pub fn new(application_public_key: PublicKey, chain: impl Into<String>, session_block_height: u64) -> Self {
        Self {
            application_public_key,
            chain: chain.into(),
            session_block_height,
        }
    }

    /// Structural checks: hex chain identifier and a non-zero height.
    pub fn validate(&self) -> Result<()> {
        validate_chain_id(&self.chain)?;
        if self.session_block_height == 0 {
            return Err(CoreError::InvalidSessionHeight);
        }
        Ok(())
    }
}

/// Chain identifiers are non-empty hex strings ("0001", "0021", ...)
pub fn validate_chain_id(chain: &str) -> Result<()> {
    if chain.is_empty() {
        return Err(CoreError::EmptyChain);
    }
    if !chain.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidChain(chain.to_string()));
    }
    Ok(())
}

/// Deterministic assignment of servicers to an application on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub header: SessionHeader,
    /// Seed derived from the session block hash and the header
    pub session_key: [u8; 32],
    /// Ordered servicer addresses
    pub session_nodes: Vec<Address>,
}

impl Session {
    pub fn contains(&self, address: &Address) -> bool {
        self.session_nodes.contains(address)
    }
}

impl CacheObject for Session {}

/// A staked application as reported by the stake ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub public_key: PublicKey,
    pub chains: Vec<String>,
    /// Relays the application may consume per session, across all servicers
    pub max_relays: u64,
    pub jailed: bool,
}

impl Application {
    pub fn supports_chain(&self, chain: &str) -> bool {
        self.chains.iter().any(|c| c == chain)
    }
}

/// A staked servicer as reported by the stake ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub public_key: PublicKey,
    pub chains: Vec<String>,
    pub service_url: String,
    pub jailed: bool,
}

/// Module parameters exposed through the query surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub session_node_count: u64,
    pub claim_submission_window: u64,
    pub supported_blockchains: Vec<String>,
    pub claim_expiration: u64,
    pub minimum_number_of_proofs: u64,
}

/// Basic auth credentials for a hosted chain endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An external blockchain this node serves relays for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedBlockchain {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
}
