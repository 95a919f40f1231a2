//! Canonical CBOR encode/decode.
//!
//! Storage bodies (patches, trust records, checkpoints, boundary records)
//! and hashing inputs are encoded as deterministic CBOR: definite-length
//! containers only, map keys emitted in a fixed order. Determinism comes
//! from construction: every map that reaches this module is either a
//! struct with a fixed field order or a `BTreeMap`, so equal values
//! encode to identical bytes.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ErrorCode;

/// Encode or decode failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl CodecError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::Codec
    }
}

/// Encode `value` as canonical CBOR.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when the value cannot be represented.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(bytes)
}

/// Decode canonical CBOR bytes into `T`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] on malformed input or a shape mismatch.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    ciborium::from_reader(bytes).map_err(|err| CodecError::Decode(err.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn roundtrips_btreemap() {
        let mut map = BTreeMap::new();
        map.insert("b".to_owned(), 2u64);
        map.insert("a".to_owned(), 1u64);
        let bytes = encode(&map).expect("encodes");
        let back: BTreeMap<String, u64> = decode(&bytes).expect("decodes");
        assert_eq!(back, map);
    }

    #[test]
    fn equal_maps_encode_identically() {
        let mut first = BTreeMap::new();
        first.insert("z".to_owned(), 1u64);
        first.insert("a".to_owned(), 2u64);
        let mut second = BTreeMap::new();
        second.insert("a".to_owned(), 2u64);
        second.insert("z".to_owned(), 1u64);
        assert_eq!(
            encode(&first).expect("encodes"),
            encode(&second).expect("encodes")
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let result: Result<BTreeMap<String, u64>, _> = decode(&[0xff, 0x00, 0x01]);
        assert!(result.is_err());
    }
}
