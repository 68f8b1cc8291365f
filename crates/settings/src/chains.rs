//! Hosted blockchains file
//!
//! A JSON array of `{ "id": "0001", "url": "...", "basic_auth": {...} }`.

use std::collections::HashSet;
use std::path::Path;

use relaycraft_core::{validate_chain_id, HostedBlockchain};
use tracing::info;

use crate::{Result, SettingsError};

pub fn load_hosted_chains(path: &Path) -> Result<Vec<HostedBlockchain>> {
    let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
    let chains: Vec<HostedBlockchain> =
        serde_json::from_str(&content).map_err(SettingsError::ParseError)?;

    let mut seen = HashSet::new();
    for chain in &chains {
        validate_chain_id(&chain.id)
            .map_err(|e| SettingsError::InvalidHostedChain(format!("{}: {}", chain.id, e)))?;
        if chain.url.is_empty() {
            return Err(SettingsError::InvalidHostedChain(format!("{}: empty url", chain.id)));
        }
        if !seen.insert(chain.id.as_str()) {
            return Err(SettingsError::InvalidHostedChain(format!("{}: duplicate id", chain.id)));
        }
    }

    info!("Loaded {} hosted chains from {:?}", chains.len(), path);
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("chains.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_chains() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"[
                {"id": "0001", "url": "http://localhost:8081"},
                {"id": "0021", "url": "http://localhost:8545", "basic_auth": {"username": "u", "password": "p"}}
            ]"#,
        );
        let chains = load_hosted_chains(&path).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[1].basic_auth.as_ref().unwrap().username, "u");
    }

    #[test]
    fn test_rejects_bad_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(&dir, r#"[{"id": "eth", "url": "http://x"}]"#);
        assert!(matches!(
            load_hosted_chains(&path),
            Err(SettingsError::InvalidHostedChain(_))
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"[{"id": "0001", "url": "http://a"}, {"id": "0001", "url": "http://b"}]"#,
        );
        assert!(matches!(
            load_hosted_chains(&path),
            Err(SettingsError::InvalidHostedChain(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            load_hosted_chains(&dir.path().join("none.json")),
            Err(SettingsError::ReadError(_))
        ));
    }
}
