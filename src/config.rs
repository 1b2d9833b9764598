// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `HARMONY_PSK_HEX` | 64 hex character AES-256 key shared with the edge devices | Required |
//! | `STORE_BACKEND` | `memory` or `firebase` | `memory` |
//! | `FIREBASE_DB_URL` | Realtime Database base URL | Required for `firebase` |
//! | `FIREBASE_AUTH_TOKEN` | Database auth token (`?auth=`) | Optional |
//! | `STORE_SEED_FILE` | JSON document loaded into the memory store | Optional |
//! | `SITE_ROOT` | Root path of the site in the store | `site` |
//! | `STARTUP_GRACE_MS` | Time before the site reports ready without device data | `5000` |
//! | `COMMAND_SOURCE` | `source` field on written commands | `web_dashboard` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DEFAULT_COMMAND_SOURCE;
use crate::paths::DEFAULT_SITE_ROOT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Pre-shared key. Never logged.
pub const PSK_ENV: &str = "HARMONY_PSK_HEX";

pub const STORE_BACKEND_ENV: &str = "STORE_BACKEND";
pub const FIREBASE_DB_URL_ENV: &str = "FIREBASE_DB_URL";
pub const FIREBASE_AUTH_TOKEN_ENV: &str = "FIREBASE_AUTH_TOKEN";
pub const STORE_SEED_FILE_ENV: &str = "STORE_SEED_FILE";
pub const SITE_ROOT_ENV: &str = "SITE_ROOT";
pub const STARTUP_GRACE_MS_ENV: &str = "STARTUP_GRACE_MS";
pub const COMMAND_SOURCE_ENV: &str = "COMMAND_SOURCE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACE_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Where site data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store, optionally seeded from a JSON file.
    Memory { seed_file: Option<PathBuf> },
    Firebase {
        db_url: String,
        auth_token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub psk_hex: String,
    pub store: StoreBackend,
    pub site_root: String,
    pub startup_grace: Duration,
    pub command_source: String,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("psk_hex", &"<redacted>")
            .field("store", &self.store)
            .field("site_root", &self.site_root)
            .field("startup_grace", &self.startup_grace)
            .field("command_source", &self.command_source)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: PORT_ENV,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let psk_hex = get(PSK_ENV).ok_or(ConfigError::Missing(PSK_ENV))?;

        let store = match get(STORE_BACKEND_ENV).as_deref() {
            None | Some("memory") => StoreBackend::Memory {
                seed_file: get(STORE_SEED_FILE_ENV).map(PathBuf::from),
            },
            Some("firebase") => StoreBackend::Firebase {
                db_url: get(FIREBASE_DB_URL_ENV).ok_or(ConfigError::Missing(FIREBASE_DB_URL_ENV))?,
                auth_token: get(FIREBASE_AUTH_TOKEN_ENV),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: STORE_BACKEND_ENV,
                    value: other.to_string(),
                    reason: "expected `memory` or `firebase`".to_string(),
                })
            }
        };

        let grace_ms = match get(STARTUP_GRACE_MS_ENV) {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: STARTUP_GRACE_MS_ENV,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_GRACE_MS,
        };

        let log_format = match get(LOG_FORMAT_ENV).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            psk_hex,
            store,
            site_root: get(SITE_ROOT_ENV).unwrap_or_else(|| DEFAULT_SITE_ROOT.to_string()),
            startup_grace: Duration::from_millis(grace_ms),
            command_source: get(COMMAND_SOURCE_ENV).unwrap_or_else(|| DEFAULT_COMMAND_SOURCE.to_string()),
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
