//! Versioned record envelope
//!
//! `MAGIC(2) || version_be(2) || bincode(value)`. Records without the
//! envelope are legacy and only readable by a migration.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{CacheError, Result, CURRENT_SCHEMA_VERSION};

const MAGIC: [u8; 2] = *b"RC";

/// Length of the envelope header
pub const HEADER_LEN: usize = 4;

fn header() -> [u8; HEADER_LEN] {
    let version = (CURRENT_SCHEMA_VERSION as u16).to_be_bytes();
    [MAGIC[0], MAGIC[1], version[0], version[1]]
}

/// Encode a value in the current envelope
pub fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(&header());
    bincode::serialize_into(&mut out, value)?;
    Ok(out)
}

/// True if `bytes` start with the current envelope header
pub fn is_current(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_LEN && bytes[..HEADER_LEN] == header()
}

/// Decode a current-envelope record; anything else is `LegacyEncoding`
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    if !is_current(bytes) {
        return Err(CacheError::LegacyEncoding);
    }
    Ok(bincode::deserialize(&bytes[HEADER_LEN..])?)
}
