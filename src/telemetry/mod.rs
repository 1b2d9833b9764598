// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Telemetry Ingestion
//!
//! Everything between the realtime store and the fused site view:
//!
//! - [`envelope`] - wire codec for encrypted sensor payloads
//! - [`crypto`] - AES-256-GCM verification and decryption
//! - [`subscriber`] - live subscription that decrypts, fuses and republishes
//! - [`snapshot`] - the immutable view handed to readers

pub mod crypto;
pub mod envelope;
pub mod snapshot;
pub mod subscriber;

pub use crypto::{decrypt, DecryptError, DecryptionKey, KeyError};
pub use envelope::{decode, is_encrypted, DecodeError, EncryptedEnvelope};
pub use snapshot::{SecurityStatus, SiteSnapshot};
pub use subscriber::{StreamPayload, TelemetrySubscriber, TelemetrySubscription};
