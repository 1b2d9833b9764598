// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM decryption of edge telemetry envelopes.
//!
//! ## Security Model
//!
//! - Edge devices and this service share a 256-bit pre-shared key
//! - Every message carries its own 96-bit IV and a 128-bit tag
//! - No associated data is authenticated
//! - A tag mismatch is reported as [`DecryptError::Tamper`] and nothing else
//!
//! The key is imported once at startup and is only ever used to open
//! envelopes. This module has no encryption entry point.

use std::fmt;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use serde_json::Value;

use super::envelope::EncryptedEnvelope;

/// The only envelope protocol version this service understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Errors from [`decrypt`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    /// Protocol mismatch. The stream is unavailable, not tampered.
    #[error("unsupported envelope version {0} (expected 1)")]
    UnsupportedVersion(u32),

    /// Authentication tag verification failed.
    #[error("authentication tag mismatch: payload corrupted or forged")]
    Tamper,

    /// Authenticated plaintext was not the JSON the producer promised.
    #[error("authenticated payload is not valid JSON: {0}")]
    PayloadFormat(String),
}

/// Errors while importing the pre-shared key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("pre-shared key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("pre-shared key must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Imported pre-shared key, decrypt-only.
///
/// Built once at startup and shared behind an `Arc`.
pub struct DecryptionKey {
    key: LessSafeKey,
}

impl DecryptionKey {
    /// Import raw key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let unbound =
            UnboundKey::new(&AES_256_GCM, bytes).map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// Import a key given as 64 hex characters (the format edge firmware is
    /// provisioned with).
    pub fn from_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("algorithm", &"AES-256-GCM")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Verify and decrypt an envelope, then parse the plaintext as JSON.
///
/// Stateless: the same envelope and key always give the same result.
pub fn decrypt(envelope: &EncryptedEnvelope, key: &DecryptionKey) -> Result<Value, DecryptError> {
    if envelope.version != SUPPORTED_VERSION {
        return Err(DecryptError::UnsupportedVersion(envelope.version));
    }

    // GCM expects ciphertext || tag
    let mut in_out = Vec::with_capacity(envelope.ciphertext.len() + envelope.auth_tag.len());
    in_out.extend_from_slice(&envelope.ciphertext);
    in_out.extend_from_slice(&envelope.auth_tag);

    let nonce = Nonce::assume_unique_for_key(envelope.iv);
    let plaintext = key
        .key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| DecryptError::Tamper)?;

    let text =
        std::str::from_utf8(plaintext).map_err(|e| DecryptError::PayloadFormat(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| DecryptError::PayloadFormat(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::super::envelope::{decode, IV_LEN, TAG_LEN};
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    fn sample_vitals() -> Value {
        json!({
            "heart_rate_bpm": 72,
            "body_temp_c": 36.5,
            "gas_ppm": 412.0,
            "accel": [0.01, -0.02, 0.98],
            "label": "wearable-01"
        })
    }

    #[test]
    fn round_trip_through_wire_format() {
        let key = test_key();
        let plaintext = sample_vitals();

        let wire = seal_json(TEST_KEY_HEX, [1u8; IV_LEN], &plaintext).to_wire();
        let decrypted = decrypt(&decode(&wire).unwrap(), &key).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn every_single_bit_flip_in_ciphertext_is_tamper() {
        let key = test_key();
        let envelope = seal_json(TEST_KEY_HEX, [2u8; IV_LEN], &sample_vitals());

        for byte in 0..envelope.ciphertext.len() {
            for bit in 0..8 {
                let mut forged = envelope.clone();
                forged.ciphertext[byte] ^= 1 << bit;
                assert_eq!(decrypt(&forged, &key), Err(DecryptError::Tamper));
            }
        }
    }

    #[test]
    fn every_single_bit_flip_in_tag_is_tamper() {
        let key = test_key();
        let envelope = seal_json(TEST_KEY_HEX, [3u8; IV_LEN], &sample_vitals());

        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let mut forged = envelope.clone();
                forged.auth_tag[byte] ^= 1 << bit;
                assert_eq!(decrypt(&forged, &key), Err(DecryptError::Tamper));
            }
        }
    }

    #[test]
    fn modified_iv_is_tamper() {
        let key = test_key();
        let mut envelope = seal_json(TEST_KEY_HEX, [4u8; IV_LEN], &sample_vitals());
        envelope.iv[0] ^= 0x80;
        assert_eq!(decrypt(&envelope, &key), Err(DecryptError::Tamper));
    }

    #[test]
    fn wrong_key_is_tamper() {
        let other = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
        let envelope = seal_json(other, [5u8; IV_LEN], &sample_vitals());
        assert_eq!(decrypt(&envelope, &test_key()), Err(DecryptError::Tamper));
    }

    #[test]
    fn unsupported_version_is_not_tamper() {
        let mut envelope = seal_json(TEST_KEY_HEX, [6u8; IV_LEN], &sample_vitals());
        envelope.version = 2;
        assert_eq!(
            decrypt(&envelope, &test_key()),
            Err(DecryptError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn authenticated_garbage_is_payload_format_error() {
        let envelope = seal_bytes(TEST_KEY_HEX, [7u8; IV_LEN], b"{not json");
        assert!(matches!(
            decrypt(&envelope, &test_key()),
            Err(DecryptError::PayloadFormat(_))
        ));

        let envelope = seal_bytes(TEST_KEY_HEX, [8u8; IV_LEN], &[0xff, 0xfe, 0xfd]);
        assert!(matches!(
            decrypt(&envelope, &test_key()),
            Err(DecryptError::PayloadFormat(_))
        ));
    }

    #[test]
    fn decrypt_is_deterministic() {
        let key = test_key();
        let good = seal_json(TEST_KEY_HEX, [9u8; IV_LEN], &sample_vitals());
        assert_eq!(decrypt(&good, &key), decrypt(&good, &key));

        let mut bad = good.clone();
        bad.auth_tag[0] ^= 1;
        assert_eq!(decrypt(&bad, &key), decrypt(&bad, &key));
    }

    #[test]
    fn key_import_validates_input() {
        assert!(DecryptionKey::from_hex(TEST_KEY_HEX).is_ok());
        assert!(matches!(
            DecryptionKey::from_hex("zz"),
            Err(KeyError::InvalidHex(_))
        ));
        assert_eq!(
            DecryptionKey::from_hex("00ff").unwrap_err(),
            KeyError::InvalidLength(2)
        );
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", test_key());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("4a7b"));
    }
}
