use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relaycraft_core::HostedBlockchain;
use tracing::info;

/// Chains this node forwards relays to, keyed by chain id.
///
/// Readers take a cheap snapshot; `replace` swaps the whole map so a reader
/// never sees a half-updated set.
#[derive(Debug, Default)]
pub struct HostedBlockchains {
    chains: RwLock<Arc<HashMap<String, HostedBlockchain>>>,
}

fn index(chains: Vec<HostedBlockchain>) -> HashMap<String, HostedBlockchain> {
    chains.into_iter().map(|c| (c.id.clone(), c)).collect()
}

impl HostedBlockchains {
    pub fn new(chains: Vec<HostedBlockchain>) -> Self {
        Self {
            chains: RwLock::new(Arc::new(index(chains))),
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, HostedBlockchain>> {
        Arc::clone(&self.chains.read())
    }

    pub fn get(&self, id: &str) -> Option<HostedBlockchain> {
        self.chains.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chains.read().contains_key(id)
    }

    /// Hot swap the full set
    pub fn replace(&self, chains: Vec<HostedBlockchain>) {
        let next = Arc::new(index(chains));
        let count = next.len();
        *self.chains.write() = next;
        info!("Hosted blockchains replaced ({} chains)", count);
    }

    /// Sorted chain ids
    pub fn chain_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.chains.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.chains.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
