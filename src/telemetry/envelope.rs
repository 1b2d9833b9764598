// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wire codec for encrypted sensor envelopes.
//!
//! Edge devices publish encrypted readings as:
//!
//! ```text
//! { "s": { "v": 1, "iv": "<base64 12 bytes>", "ct": "<base64>", "at": "<base64 16 bytes>" } }
//! ```
//!
//! Anything without the nested `s` block is legacy plaintext telemetry.

use base64ct::{Base64, Encoding};
use serde_json::{json, Value};

/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes (128-bit tag).
pub const TAG_LEN: usize = 16;

/// Key of the nested envelope object.
const ENVELOPE_KEY: &str = "s";

/// Errors produced while decoding an envelope from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// A decoded envelope. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub auth_tag: [u8; TAG_LEN],
}

impl EncryptedEnvelope {
    /// Render the envelope in its wire shape.
    pub fn to_wire(&self) -> Value {
        json!({
            "s": {
                "v": self.version,
                "iv": Base64::encode_string(&self.iv),
                "ct": Base64::encode_string(&self.ciphertext),
                "at": Base64::encode_string(&self.auth_tag),
            }
        })
    }
}

/// True when `raw` carries a nested envelope with a numeric version and both
/// an IV and ciphertext.
///
/// Mirrors how the dashboard has always told encrypted payloads apart from
/// legacy plaintext: presence checks only, no decoding.
pub fn is_encrypted(raw: &Value) -> bool {
    let Some(envelope) = raw.get(ENVELOPE_KEY).and_then(Value::as_object) else {
        return false;
    };

    let version_is_numeric = envelope.get("v").is_some_and(Value::is_number);
    version_is_numeric && is_truthy(envelope.get("iv")) && is_truthy(envelope.get("ct"))
}

/// Decode the wire form into raw bytes.
pub fn decode(raw: &Value) -> Result<EncryptedEnvelope, DecodeError> {
    let envelope = raw
        .get(ENVELOPE_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("missing envelope object"))?;

    let version = envelope
        .get("v")
        .ok_or_else(|| malformed("missing version"))?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| malformed("version is not a non-negative integer"))?;

    let iv = decode_field(envelope.get("iv"), "iv")?;
    let ciphertext = decode_field(envelope.get("ct"), "ct")?;
    let auth_tag = decode_field(envelope.get("at"), "at")?;

    let iv: [u8; IV_LEN] = iv.try_into().map_err(|bytes: Vec<u8>| {
        malformed(format!("iv must be {IV_LEN} bytes, got {}", bytes.len()))
    })?;
    let auth_tag: [u8; TAG_LEN] = auth_tag.try_into().map_err(|bytes: Vec<u8>| {
        malformed(format!("auth tag must be {TAG_LEN} bytes, got {}", bytes.len()))
    })?;

    Ok(EncryptedEnvelope {
        version,
        iv,
        ciphertext,
        auth_tag,
    })
}

fn decode_field(field: Option<&Value>, name: &str) -> Result<Vec<u8>, DecodeError> {
    let encoded = field
        .ok_or_else(|| malformed(format!("missing field `{name}`")))?
        .as_str()
        .ok_or_else(|| malformed(format!("field `{name}` is not a string")))?;

    Base64::decode_vec(encoded)
        .map_err(|e| malformed(format!("field `{name}` is not valid base64: {e}")))
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn malformed(msg: impl Into<String>) -> DecodeError {
    DecodeError::MalformedEnvelope(msg.into())
}
