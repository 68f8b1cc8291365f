//! Collaborators consumed by the servicer core.
//!
//! The stake ledger and consensus engine are queried synchronously at a
//! pinned height; hosted chain execution is async; metrics are
//! fire-and-forget.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::{
    Address, Application, BlockHash, HostedBlockchain, Parameters, PublicKey, RelayPayload,
    Validator,
};

/// A value that can be held in a servicer cache store
pub trait CacheObject: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Sealed values refuse normal overwrites
    fn is_sealed(&self) -> bool {
        false
    }
}

/// Failure to obtain a consensus view at a height
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Block height {height} is in the future (latest {latest})")]
    FutureHeight { height: u64, latest: u64 },

    #[error("Block height {0} has been pruned")]
    Pruned(u64),

    #[error("Consensus context unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the consensus engine
pub trait ConsensusContext: Send + Sync {
    /// Latest committed block height
    fn current_height(&self) -> u64;

    /// Hash of the block at `height`
    fn block_hash(&self, height: u64) -> Result<BlockHash, ContextError>;
}

/// Read-only access to the staking ledger, pinned to a height
pub trait StakeLedger: Send + Sync {
    /// Staked servicers for `chain` at `height` (order not significant)
    fn validators_for_chain(&self, height: u64, chain: &str) -> Vec<Validator>;

    fn validator(&self, height: u64, address: &Address) -> Option<Validator>;

    fn application(&self, height: u64, public_key: &PublicKey) -> Option<Application>;

    fn blocks_per_session(&self, height: u64) -> u64;

    fn session_node_count(&self, height: u64) -> u64;

    fn supported_blockchains(&self, height: u64) -> Vec<String>;

    fn parameters(&self, height: u64) -> Parameters;
}

/// Failure executing a payload against a hosted chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Hosted chain request failed: {0}")]
    Request(String),

    #[error("Hosted chain returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Hosted chain timed out")]
    Timeout,
}

/// Forwards relay payloads to externally hosted blockchains
#[async_trait]
pub trait ChainExecutor: Send + Sync {
    async fn execute(
        &self,
        chain: &HostedBlockchain,
        payload: &RelayPayload,
    ) -> Result<String, ExecutionError>;
}

/// Fire-and-forget service observations
pub trait ServiceMetrics: Send + Sync {
    fn add_relay_timing_for(&self, chain: &str, millis: f64, servicer: &Address);

    fn add_relay_for(&self, chain: &str, servicer: &Address);

    fn add_challenge_for(&self, chain: &str, servicer: &Address);
}

/// Metrics sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl ServiceMetrics for NoopMetrics {
    fn add_relay_timing_for(&self, _chain: &str, _millis: f64, _servicer: &Address) {}

    fn add_relay_for(&self, _chain: &str, _servicer: &Address) {}

    fn add_challenge_for(&self, _chain: &str, _servicer: &Address) {}
}
