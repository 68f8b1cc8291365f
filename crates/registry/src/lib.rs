//! RelayCraft Node Registry
//!
//! Servicer identities hosted by this process, their per-identity evidence
//! and session stores, and the hosted blockchain map shared by the relay
//! path.

mod hosted;
mod node;
mod registry;

pub use hosted::HostedBlockchains;
pub use node::{CacheConfig, NodeCaches, ServicerNode};
pub use registry::{NodeRegistry, RegistryMode};

use relaycraft_core::Address;
use relaycraft_evidence::EvidenceError;
use relaycraft_session::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No servicer identity for address {0}")]
    NotFound(Address),

    #[error("No servicer identities registered")]
    Empty,

    #[error("Evidence store error: {0}")]
    Evidence(#[from] EvidenceError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
