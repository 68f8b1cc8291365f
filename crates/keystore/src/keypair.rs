use std::path::{Path, PathBuf};

use relaycraft_crypto::{KeyError, SigningKeypair};
use thiserror::Error;
use tracing::info;

use crate::paths::default_keystore_dir;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid key file {path:?}: {source}")]
    InvalidKey { path: PathBuf, source: KeyError },
}

/// `~/.relaycraft/keys/servicer.key`
pub fn default_key_path() -> PathBuf {
    default_keystore_dir().join("servicer.key")
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> KeystoreError + '_ {
    move |source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write a secret key as hex, readable by the owner only
pub fn save_keypair_bytes(path: &Path, secret: &[u8; 32]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }
    std::fs::write(path, hex::encode(secret)).map_err(io_err(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err(path))?;
    }
    Ok(())
}

/// Load the servicer key at `path`, generating and saving one if missing
pub fn load_or_generate_signing_keypair(path: &Path) -> Result<SigningKeypair, KeystoreError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(io_err(path))?;
        let keypair = SigningKeypair::from_secret_hex(content.trim()).map_err(|source| {
            KeystoreError::InvalidKey {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!("Loaded servicer key from {:?}", path);
        return Ok(keypair);
    }

    let keypair = SigningKeypair::generate();
    save_keypair_bytes(path, &keypair.secret_key_bytes())?;
    info!("Generated new servicer key at {:?}", path);
    Ok(keypair)
}

/// Load (or generate) one keypair per path
pub fn load_signing_keypairs(paths: &[PathBuf]) -> Result<Vec<SigningKeypair>, KeystoreError> {
    paths
        .iter()
        .map(|p| load_or_generate_signing_keypair(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys").join("servicer.key");
        let generated = load_or_generate_signing_keypair(&path).unwrap();
        assert!(path.exists());

        let loaded = load_or_generate_signing_keypair(&path).unwrap();
        assert_eq!(generated.public_key_bytes(), loaded.public_key_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servicer.key");
        load_or_generate_signing_keypair(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servicer.key");
        std::fs::write(&path, "zz").unwrap();
        assert!(matches!(
            load_or_generate_signing_keypair(&path),
            Err(KeystoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_load_many() {
        let dir = TempDir::new().unwrap();
        let paths = vec![dir.path().join("a.key"), dir.path().join("b.key")];
        let keys = load_signing_keypairs(&paths).unwrap();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0].public_key_bytes(), keys[1].public_key_bytes());
    }
}
