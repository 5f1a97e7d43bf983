//! JSON codec using `serde_json`.
//!
//! Structs are serialized as objects with camelCase field names, so a peer
//! written in any language with a JSON library can read and produce the
//! payloads.

use crate::error::Result;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to UTF-8 JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode UTF-8 JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
