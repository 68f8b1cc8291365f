//! Session derivation
//!
//! Every honest node computes the same session from the same inputs:
//! the session key commits to the block hash at the session height and to
//! the header, and servicers are drawn from the address-sorted eligible set
//! by repeatedly re-hashing that key.

use relaycraft_core::{Address, BlockHash, ConsensusContext, Session, SessionHeader, StakeLedger};
use relaycraft_crypto::hash;
use tracing::debug;

use crate::{Result, SessionError, SessionStore};

/// Session key = SHA-256(block_hash || app key || chain || height_be)
pub fn session_key(header: &SessionHeader, block_hash: &BlockHash) -> [u8; 32] {
    let mut data = Vec::with_capacity(32 + 32 + header.chain.len() + 8);
    data.extend_from_slice(block_hash);
    data.extend_from_slice(&header.application_public_key);
    data.extend_from_slice(header.chain.as_bytes());
    data.extend_from_slice(&header.session_block_height.to_be_bytes());
    hash(&data)
}

/// Draw an index in `0..n` from the seed, re-hashing until the first eight
/// bytes fall inside the unbiased zone.
fn pick_index(seed: &mut [u8; 32], n: usize) -> usize {
    let n = n as u64;
    let zone = u64::MAX - (u64::MAX % n);
    loop {
        *seed = hash(seed.as_slice());
        let mut word = [0u8; 8];
        word.copy_from_slice(&seed[..8]);
        let value = u64::from_be_bytes(word);
        if value < zone {
            return (value % n) as usize;
        }
    }
}

/// Pure session derivation.
///
/// When fewer than `session_size` servicers are eligible the whole
/// eligible set is returned, in draw order.
pub fn derive_session(
    header: &SessionHeader,
    block_hash: &BlockHash,
    eligible: &[Address],
    session_size: usize,
) -> Session {
    let key = session_key(header, block_hash);

    let mut pool: Vec<Address> = eligible.to_vec();
    pool.sort();
    pool.dedup();

    let mut seed = key;
    let mut session_nodes = Vec::with_capacity(session_size.min(pool.len()));
    while session_nodes.len() < session_size && !pool.is_empty() {
        let index = pick_index(&mut seed, pool.len());
        session_nodes.push(pool.remove(index));
    }

    Session {
        header: header.clone(),
        session_key: key,
        session_nodes,
    }
}

/// Derives sessions from the ledger and consensus at the session height
pub struct SessionDeriver<'a> {
    consensus: &'a dyn ConsensusContext,
    ledger: &'a dyn StakeLedger,
}

impl<'a> SessionDeriver<'a> {
    pub fn new(consensus: &'a dyn ConsensusContext, ledger: &'a dyn StakeLedger) -> Self {
        Self { consensus, ledger }
    }

    /// Derive without consulting any cache
    pub fn derive(&self, header: &SessionHeader) -> Result<Session> {
        header.validate()?;
        let height = header.session_block_height;
        let block_hash = self.consensus.block_hash(height)?;

        let eligible: Vec<Address> = self
            .ledger
            .validators_for_chain(height, &header.chain)
            .into_iter()
            .filter(|v| !v.jailed)
            .map(|v| v.address)
            .collect();
        if eligible.is_empty() {
            return Err(SessionError::NoEligibleServicers {
                chain: header.chain.clone(),
                height,
            });
        }

        let session_size = self.ledger.session_node_count(height) as usize;
        Ok(derive_session(header, &block_hash, &eligible, session_size))
    }

    /// Cached session for `header`, deriving and caching it on a miss.
    ///
    /// Concurrent misses may both derive; the results are identical so the
    /// last write wins.
    pub fn derive_or_fetch(&self, store: &SessionStore, header: &SessionHeader) -> Result<Session> {
        if let Some(session) = store.get_session(header)? {
            return Ok(session);
        }
        let session = self.derive(header)?;
        debug!(
            "Derived session for chain {} at height {} with {} nodes",
            header.chain,
            header.session_block_height,
            session.session_nodes.len()
        );
        store.set_session(session.clone())?;
        Ok(session)
    }
}
