//! Hashing, message authentication, and Ed25519 signatures.
//!
//! Wire conventions: digests and MAC tags are lowercase hex; public keys
//! and signatures travel as base64-encoded raw bytes (32-byte keys,
//! 64-byte signatures). A key id is `"ed25519:"` followed by the SHA-256
//! hex of the raw public key.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use hmac::{Hmac, Mac as _};
use sha2::{Digest as _, Sha256};

use crate::error::ErrorCode;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every key id.
pub const KEY_ID_PREFIX: &str = "ed25519:";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Key-material failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// A key did not decode to the expected raw form.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl CryptoError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::TrustInvalidKey
    }
}

// ---------------------------------------------------------------------------
// Digests and MACs
// ---------------------------------------------------------------------------

/// SHA-256 of `bytes`, lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// HMAC-SHA256 tag over `bytes` under `key`, lowercase hex.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the key is unusable.
pub fn hmac_sha256_hex(key: &[u8], bytes: &[u8]) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKey("hmac key rejected".into()))?;
    mac.update(bytes);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of an HMAC-SHA256 tag over `bytes` under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the key is unusable.
pub fn hmac_sha256_verify(key: &[u8], bytes: &[u8], tag: &[u8]) -> Result<bool, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKey("hmac key rejected".into()))?;
    mac.update(bytes);
    Ok(mac.verify_slice(tag).is_ok())
}

// ---------------------------------------------------------------------------
// Key ids and wire codecs
// ---------------------------------------------------------------------------

/// Derive the key id of a raw 32-byte public key.
#[must_use]
pub fn key_id(raw: &[u8; 32]) -> String {
    format!("{KEY_ID_PREFIX}{}", sha256_hex(raw))
}

/// Base64-encode a raw public key for the wire.
#[must_use]
pub fn encode_public_key(raw: &[u8; 32]) -> String {
    BASE64.encode(raw)
}

/// Decode a base64 public key into its raw 32 bytes.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] on bad base64 or a wrong length.
pub fn decode_public_key(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidKey("public key is not valid base64".into()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("public key is {} bytes, want 32", bytes.len())))
}

/// The key id of a base64-encoded public key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the key does not decode.
pub fn key_id_of_public_key(encoded: &str) -> Result<String, CryptoError> {
    Ok(key_id(&decode_public_key(encoded)?))
}

// ---------------------------------------------------------------------------
// Ed25519
// ---------------------------------------------------------------------------

/// Sign `payload`, returning the base64 signature.
#[must_use]
pub fn sign_ed25519(key: &SigningKey, payload: &[u8]) -> String {
    BASE64.encode(key.sign(payload).to_bytes())
}

/// The base64 wire form of a signing key's public half.
#[must_use]
pub fn public_key_of(key: &SigningKey) -> String {
    encode_public_key(key.verifying_key().as_bytes())
}

/// Verify a base64 signature over `payload` under a base64 public key.
///
/// A malformed signature verifies as `false`; a malformed key is an
/// error, since it means the key registry itself is corrupt.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] when the public key is malformed.
pub fn verify_ed25519(
    public_key: &str,
    signature: &str,
    payload: &[u8],
) -> Result<bool, CryptoError> {
    let raw = decode_public_key(public_key)?;
    let verifying = VerifyingKey::from_bytes(&raw)
        .map_err(|_| CryptoError::InvalidKey("not a valid ed25519 point".into()))?;
    let Ok(sig_bytes) = BASE64.decode(signature) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return Ok(false);
    };
    Ok(verifying.verify(payload, &signature).is_ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn sha256_matches_reference_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        let tag = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?")
            .expect("hmac computes");
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn key_id_has_prefix_and_hex_digest() {
        let id = key_id(&[0u8; 32]);
        assert!(id.starts_with(KEY_ID_PREFIX));
        assert_eq!(id.len(), KEY_ID_PREFIX.len() + 64);
    }

    #[test]
    fn public_key_roundtrips_through_base64() {
        let key = test_key(7);
        let encoded = public_key_of(&key);
        let raw = decode_public_key(&encoded).expect("decodes");
        assert_eq!(&raw, key.verifying_key().as_bytes());
    }

    #[test]
    fn decode_rejects_bad_key_material() {
        assert!(decode_public_key("@@@not-base64@@@").is_err());
        // Valid base64, wrong length.
        let short = BASE64.encode([1u8; 16]);
        let err = decode_public_key(&short).unwrap_err();
        assert_eq!(err.code().code(), "E_TRUST_INVALID_KEY");
    }

    #[test]
    fn sign_then_verify() {
        let key = test_key(3);
        let public = public_key_of(&key);
        let sig = sign_ed25519(&key, b"payload");
        assert!(verify_ed25519(&public, &sig, b"payload").expect("verifies"));
        assert!(!verify_ed25519(&public, &sig, b"other payload").expect("verifies"));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signer = test_key(3);
        let other = test_key(4);
        let sig = sign_ed25519(&signer, b"payload");
        assert!(!verify_ed25519(&public_key_of(&other), &sig, b"payload").expect("verifies"));
    }

    #[test]
    fn malformed_signature_is_false_not_error() {
        let key = test_key(3);
        let public = public_key_of(&key);
        assert!(!verify_ed25519(&public, "???", b"payload").expect("tolerates"));
        let short = BASE64.encode([0u8; 8]);
        assert!(!verify_ed25519(&public, &short, b"payload").expect("tolerates"));
    }
}
