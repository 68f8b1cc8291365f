//! RelayCraft Settings
//!
//! Node configuration file management.
//!
//! ## Features
//!
//! - Servicer node settings (stores, lean mode, session sync, RPC timeout)
//! - Logging filter
//! - Hosted blockchains file
//! - JSON serialization
//!
//! ## Usage
//!
//! ```no_run
//! use relaycraft_settings::Settings;
//!
//! // Load or create default settings
//! let mut settings = Settings::load_or_default()?;
//!
//! // Modify settings
//! settings.node.lean = true;
//!
//! // Save settings
//! settings.save()?;
//! # Ok::<(), relaycraft_settings::SettingsError>(())
//! ```

mod chains;
mod config;

pub use chains::load_hosted_chains;
pub use config::{
    clamp_rpc_timeout, LoggingSettings, NodeSettings, Settings, DEFAULT_RPC_TIMEOUT_MS,
    MAX_RPC_TIMEOUT_MS, MIN_RPC_TIMEOUT_MS,
};

use std::path::PathBuf;

use relaycraft_keystore::default_config_dir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid hosted chain: {0}")]
    InvalidHostedChain(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
