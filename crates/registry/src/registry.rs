use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use relaycraft_core::Address;
use relaycraft_crypto::SigningKeypair;
use tracing::{debug, error, info, warn};

use crate::{CacheConfig, NodeCaches, RegistryError, Result, ServicerNode};

/// How identities map to stores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryMode {
    /// Many identities per process, one evidence database each.
    /// Otherwise a single identity owns the unsuffixed database.
    pub lean: bool,
}

/// Identities hosted by this process
pub struct NodeRegistry {
    mode: RegistryMode,
    nodes: RwLock<BTreeMap<Address, Arc<ServicerNode>>>,
    /// Legacy-mode owner of the stores
    legacy: Mutex<Option<(Address, NodeCaches)>>,
}

impl NodeRegistry {
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            nodes: RwLock::new(BTreeMap::new()),
            legacy: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    pub fn is_lean(&self) -> bool {
        self.mode.lean
    }

    /// Register an identity; re-adding the same key returns the existing node
    pub fn add_identity(&self, keypair: SigningKeypair) -> Arc<ServicerNode> {
        let node = ServicerNode::new(keypair);
        let address = node.address();
        let mut nodes = self.nodes.write();
        if let Some(existing) = nodes.get(&address) {
            return Arc::clone(existing);
        }
        if !self.mode.lean && !nodes.is_empty() {
            warn!("Registering servicer {} in legacy mode; only one identity will serve", address);
        }
        let node = Arc::new(node);
        nodes.insert(address, Arc::clone(&node));
        info!("Registered servicer {}", address);
        node
    }

    pub fn resolve(&self, address: &Address) -> Result<Arc<ServicerNode>> {
        self.nodes
            .read()
            .get(address)
            .cloned()
            .ok_or(RegistryError::NotFound(*address))
    }

    /// The identity with the lowest address
    pub fn any(&self) -> Result<Arc<ServicerNode>> {
        self.nodes
            .read()
            .values()
            .next()
            .cloned()
            .ok_or(RegistryError::Empty)
    }

    pub fn nodes(&self) -> Vec<Arc<ServicerNode>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initialise an identity's stores, exactly once.
    ///
    /// In legacy mode the first identity initialised owns the stores and
    /// becomes the legacy alias; any other identity is skipped (`Ok(None)`).
    pub fn init_caches(&self, node: &ServicerNode, config: &CacheConfig) -> Result<Option<NodeCaches>> {
        if self.mode.lean {
            let name = lean_db_name(config, &node.address());
            return Ok(Some(node.init_caches(config, &name)?.clone()));
        }

        let mut legacy = self.legacy.lock();
        match legacy.as_ref() {
            Some((owner, caches)) if *owner == node.address() => Ok(Some(caches.clone())),
            Some((owner, _)) => {
                debug!(
                    "Skipping stores for servicer {}: legacy mode is bound to {}",
                    node.address(),
                    owner
                );
                Ok(None)
            }
            None => {
                let caches = node.init_caches(config, &config.evidence_db_name)?.clone();
                *legacy = Some((node.address(), caches.clone()));
                Ok(Some(caches))
            }
        }
    }

    /// Evidence database each identity opens: one per identity in lean mode,
    /// only the legacy owner's (or the first identity's) otherwise
    pub fn evidence_db_names(&self, config: &CacheConfig) -> Vec<(Address, String)> {
        if self.mode.lean {
            return self
                .addresses()
                .into_iter()
                .map(|address| (address, lean_db_name(config, &address)))
                .collect();
        }
        if let Some((owner, _)) = self.legacy.lock().as_ref() {
            return vec![(*owner, config.evidence_db_name.clone())];
        }
        self.addresses()
            .into_iter()
            .take(1)
            .map(|address| (address, config.evidence_db_name.clone()))
            .collect()
    }

    /// Initialise every registered identity; returns how many got stores
    pub fn init_all_caches(&self, config: &CacheConfig) -> Result<usize> {
        let mut initialised = 0;
        for node in self.nodes() {
            if self.init_caches(&node, config)?.is_some() {
                initialised += 1;
            }
        }
        Ok(initialised)
    }

    /// Stores of the legacy-mode identity
    pub fn legacy_caches(&self) -> Option<NodeCaches> {
        self.legacy.lock().as_ref().map(|(_, caches)| caches.clone())
    }

    /// Flush every initialised store; failures are logged, not returned.
    ///
    /// Returns the number of stores that failed.
    pub fn flush_all(&self) -> usize {
        let mut failures = 0;
        for node in self.nodes() {
            let Some(caches) = node.caches() else {
                continue;
            };
            if let Err(e) = caches.evidence.flush() {
                error!("Failed to flush evidence for servicer {}: {}", node.address(), e);
                failures += 1;
            }
            if let Err(e) = caches.sessions.flush() {
                error!("Failed to flush sessions for servicer {}: {}", node.address(), e);
                failures += 1;
            }
        }
        failures
    }

    /// Drop every cached session
    pub fn clear_session_caches(&self) {
        for node in self.nodes() {
            if let Some(caches) = node.caches() {
                if let Err(e) = caches.sessions.clear() {
                    error!("Failed to clear sessions for servicer {}: {}", node.address(), e);
                }
            }
        }
    }
}

fn lean_db_name(config: &CacheConfig, address: &Address) -> String {
    format!("{}_{}", config.evidence_db_name, address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycraft_core::{EvidenceType, SessionHeader};
    use tempfile::TempDir;

    fn keypairs(n: usize) -> Vec<SigningKeypair> {
        (0..n).map(|_| SigningKeypair::generate()).collect()
    }

    #[test]
    fn test_add_identity_idempotent() {
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        let kp = SigningKeypair::generate();
        let a = registry.add_identity(kp.clone());
        let b = registry.add_identity(kp);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_and_any() {
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        assert!(matches!(registry.any(), Err(RegistryError::Empty)));

        for kp in keypairs(3) {
            registry.add_identity(kp);
        }
        let lowest = registry.addresses()[0];
        assert_eq!(registry.any().unwrap().address(), lowest);

        let unknown = Address([0xee; 20]);
        assert!(matches!(registry.resolve(&unknown), Err(RegistryError::NotFound(_))));
        assert_eq!(registry.resolve(&lowest).unwrap().address(), lowest);
    }

    #[test]
    fn test_lean_mode_separate_databases() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        let nodes: Vec<_> = keypairs(2).into_iter().map(|kp| registry.add_identity(kp)).collect();

        assert_eq!(registry.init_all_caches(&config).unwrap(), 2);
        for node in &nodes {
            let expected = dir.path().join(format!("evidence_{}", node.address()));
            assert!(expected.exists());
        }
        assert!(registry.legacy_caches().is_none());
    }

    #[test]
    fn test_evidence_db_names() {
        let config = CacheConfig::new("/data");
        let lean = NodeRegistry::new(RegistryMode { lean: true });
        let legacy = NodeRegistry::new(RegistryMode { lean: false });
        for kp in keypairs(2) {
            lean.add_identity(kp.clone());
            legacy.add_identity(kp);
        }

        let names = lean.evidence_db_names(&config);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].1, format!("evidence_{}", names[0].0));

        let names = legacy.evidence_db_names(&config);
        assert_eq!(names, vec![(legacy.addresses()[0], "evidence".to_string())]);
    }

    #[test]
    fn test_init_caches_runs_once() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        let node = registry.add_identity(SigningKeypair::generate());

        let first = registry.init_caches(&node, &config).unwrap().unwrap();
        let second = registry.init_caches(&node, &config).unwrap().unwrap();
        assert!(first.same_as(&second));
    }

    fn data_dir_entries(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_concurrent_init_lean_opens_once() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        let node = registry.add_identity(SigningKeypair::generate());

        let opened: Vec<NodeCaches> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.init_caches(&node, &config).unwrap().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for caches in &opened {
            assert!(caches.same_as(&opened[0]));
        }
        assert!(opened[0].same_as(node.caches().unwrap()));
        assert_eq!(data_dir_entries(&dir), vec![format!("evidence_{}", node.address())]);
    }

    #[test]
    fn test_concurrent_init_legacy_binds_one_identity() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: false });
        let nodes: Vec<_> = keypairs(2).into_iter().map(|kp| registry.add_identity(kp)).collect();

        let results: Vec<(Address, Option<NodeCaches>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let node = &nodes[i % 2];
                    let registry = &registry;
                    let config = &config;
                    scope.spawn(move || (node.address(), registry.init_caches(node, config).unwrap()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let owners: std::collections::BTreeSet<Address> = results
            .iter()
            .filter(|(_, caches)| caches.is_some())
            .map(|(address, _)| *address)
            .collect();
        assert_eq!(owners.len(), 1);

        let legacy = registry.legacy_caches().unwrap();
        for (_, caches) in &results {
            if let Some(caches) = caches {
                assert!(caches.same_as(&legacy));
            }
        }
        let with_stores = nodes.iter().filter(|n| n.caches().is_some()).count();
        assert_eq!(with_stores, 1);
        assert_eq!(data_dir_entries(&dir), vec!["evidence".to_string()]);
    }

    #[test]
    fn test_legacy_alias_shares_stores() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: false });
        let node = registry.add_identity(SigningKeypair::generate());
        registry.init_caches(&node, &config).unwrap();

        let legacy = registry.legacy_caches().unwrap();
        assert!(legacy.same_as(node.caches().unwrap()));
        assert!(dir.path().join("evidence").exists());

        // Writes through the alias are visible through the identity
        let header = SessionHeader::new([1u8; 32], "0001", 1);
        assert!(legacy.evidence.get_evidence(&header, EvidenceType::Relay, 5).unwrap().is_empty());
    }

    #[test]
    fn test_legacy_mode_skips_second_identity() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: false });
        let first = registry.add_identity(SigningKeypair::generate());
        let second = registry.add_identity(SigningKeypair::generate());

        assert!(registry.init_caches(&first, &config).unwrap().is_some());
        assert!(registry.init_caches(&second, &config).unwrap().is_none());
        assert!(second.caches().is_none());
    }

    #[test]
    fn test_flush_and_clear_sessions() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path());
        let registry = NodeRegistry::new(RegistryMode { lean: true });
        let node = registry.add_identity(SigningKeypair::generate());
        let caches = registry.init_caches(&node, &config).unwrap().unwrap();

        caches
            .sessions
            .set_session(relaycraft_core::Session {
                header: SessionHeader::new([1u8; 32], "0001", 1),
                session_key: [0u8; 32],
                session_nodes: vec![node.address()],
            })
            .unwrap();
        assert_eq!(registry.flush_all(), 0);

        registry.clear_session_caches();
        assert!(caches.sessions.is_empty());
    }
}
