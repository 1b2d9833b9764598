// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Harmony Aura - Telemetry Core
//!
//! Subscribes to encrypted wearable and edge telemetry in the site's realtime
//! store, verifies and decrypts it, fuses worker and machine signals into a
//! composite risk score, and writes operator commands back to the store.
//!
//! ## Modules
//!
//! - `telemetry` - Envelope decoding, AES-256-GCM decryption, live site view
//! - `risk` - Composite risk fusion
//! - `dispatch` - Operator commands and rest request decisions
//! - `store` - Realtime store abstraction (in-memory and Firebase RTDB)
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;
pub mod risk;
pub mod state;
pub mod store;
pub mod telemetry;
