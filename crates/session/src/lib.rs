//! RelayCraft Sessions
//!
//! Deterministic assignment of servicers to (application, chain, height),
//! the per-identity session cache, and session height arithmetic.

mod derive;
mod height;
mod store;

pub use derive::{derive_session, session_key, SessionDeriver};
pub use height::{is_session_block, is_within_tolerance, latest_session_block_height};
pub use store::{session_cache_key, SessionStore};

use relaycraft_cache::CacheError;
use relaycraft_core::{ContextError, CoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session header: {0}")]
    InvalidHeader(#[from] CoreError),

    #[error("Consensus context unavailable: {0}")]
    ContextUnavailable(#[from] ContextError),

    #[error("No eligible servicers for chain {chain} at height {height}")]
    NoEligibleServicers { chain: String, height: u64 },

    #[error("Session cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
