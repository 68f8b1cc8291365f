//! RelayCraft Cryptography
//!
//! Ed25519 signing keys, SHA-256 hashing and validator address derivation.

mod keys;
mod sign;

pub use keys::*;
pub use sign::*;
