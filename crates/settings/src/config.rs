//! Configuration types

use std::path::{Path, PathBuf};

use relaycraft_keystore::{default_config_dir, default_key_path, expand_path};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{default_settings_path, Result, SettingsError};

pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 3000;
pub const MIN_RPC_TIMEOUT_MS: u64 = 1;
pub const MAX_RPC_TIMEOUT_MS: u64 = 1_000_000;

/// Hosted chain timeout; values outside `[1, 1_000_000]` fall back to 3000
pub fn clamp_rpc_timeout(timeout_ms: u64) -> u64 {
    if (MIN_RPC_TIMEOUT_MS..=MAX_RPC_TIMEOUT_MS).contains(&timeout_ms) {
        timeout_ms
    } else {
        warn!(
            "RPC timeout {}ms out of range, using default {}ms",
            timeout_ms, DEFAULT_RPC_TIMEOUT_MS
        );
        DEFAULT_RPC_TIMEOUT_MS
    }
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Servicer node settings
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.to_path_buf());
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.to_path_buf());
            Ok(settings)
        }
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// Servicer node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Directory holding the evidence databases
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Evidence database name; lean mode appends `_<address>`
    #[serde(default = "default_evidence_db_name")]
    pub evidence_db_name: String,

    #[serde(default = "default_cache_entries")]
    pub max_evidence_cache_entries: usize,

    #[serde(default = "default_cache_entries")]
    pub max_session_cache_entries: usize,

    /// Serve several identities from one process
    #[serde(default)]
    pub lean: bool,

    /// Log relay validation failures
    #[serde(default = "default_true")]
    pub relay_errors: bool,

    /// Sessions a client may lag behind the latest
    #[serde(default = "default_sync_allowance")]
    pub client_session_sync_allowance: u64,

    /// Hosted chain request timeout
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Servicer key files; the default key path if empty
    #[serde(default)]
    pub keyfiles: Vec<String>,

    /// Hosted blockchains file (JSON array)
    #[serde(default)]
    pub hosted_chains_path: Option<String>,
}

fn default_data_dir() -> String {
    default_config_dir().join("data").to_string_lossy().into_owned()
}

fn default_evidence_db_name() -> String {
    "evidence".to_string()
}

fn default_cache_entries() -> usize {
    500
}

fn default_true() -> bool {
    true
}

fn default_sync_allowance() -> u64 {
    1
}

fn default_rpc_timeout() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            evidence_db_name: default_evidence_db_name(),
            max_evidence_cache_entries: default_cache_entries(),
            max_session_cache_entries: default_cache_entries(),
            lean: false,
            relay_errors: true,
            client_session_sync_allowance: default_sync_allowance(),
            rpc_timeout_ms: default_rpc_timeout(),
            keyfiles: Vec::new(),
            hosted_chains_path: None,
        }
    }
}

impl NodeSettings {
    pub fn data_path(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn keyfile_paths(&self) -> Vec<PathBuf> {
        if self.keyfiles.is_empty() {
            return vec![default_key_path()];
        }
        self.keyfiles.iter().map(|k| expand_path(k)).collect()
    }

    pub fn hosted_chains_file(&self) -> Option<PathBuf> {
        self.hosted_chains_path.as_deref().map(expand_path)
    }

    /// Timeout after range checking
    pub fn effective_rpc_timeout_ms(&self) -> u64 {
        clamp_rpc_timeout(self.rpc_timeout_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// tracing filter directive, overridden by RUST_LOG
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info,relaycraft=debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}
