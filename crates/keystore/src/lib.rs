//! RelayCraft Keystore
//!
//! Servicer key files and path utilities.
//!
//! ## Features
//!
//! - Ed25519 signing keypair loading/generation (hex secret files)
//! - Path expansion (~, environment variables)
//! - Owner-only permissions on key files (unix)

mod keypair;
mod paths;

pub use keypair::{
    default_key_path, load_or_generate_signing_keypair, load_signing_keypairs, save_keypair_bytes,
    KeystoreError,
};
pub use paths::{default_config_dir, default_keystore_dir, expand_path};

pub type Result<T> = std::result::Result<T, KeystoreError>;
