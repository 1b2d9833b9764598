// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout of the realtime store.
//!
//! ```text
//! site/
//!   iot/
//!     vitals              # wearable readings (encrypted envelope)
//!     edge_intelligence   # edge-computed CIS / PdM (encrypted envelope)
//!     status              # device heartbeat (plaintext)
//!   workers/{worker_id}
//!   machines/{machine_id}
//!   rest_requests/{request_id}
//!   commands/{command_id}       # written by this service only
//!   notifications/{id}
//!   recommendations             # { alerts: [...], count }
//!   env                         # site weather
//! ```

/// Default root under which all site data lives.
pub const DEFAULT_SITE_ROOT: &str = "site";

/// Store path utilities for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    root: String,
}

impl Default for SitePaths {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_ROOT)
    }
}

impl SitePaths {
    /// Create paths under a custom root (useful for testing and staging sites).
    pub fn new(root: impl AsRef<str>) -> Self {
        Self {
            root: root.as_ref().trim_matches('/').to_string(),
        }
    }

    /// Root path of the site.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn child(&self, rel: &str) -> String {
        if self.root.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{rel}", self.root)
        }
    }

    // ========== Device Streams ==========

    pub fn vitals(&self) -> String {
        self.child("iot/vitals")
    }

    pub fn edge_intelligence(&self) -> String {
        self.child("iot/edge_intelligence")
    }

    pub fn device_status(&self) -> String {
        self.child("iot/status")
    }

    // ========== Registries ==========

    pub fn workers(&self) -> String {
        self.child("workers")
    }

    pub fn machines(&self) -> String {
        self.child("machines")
    }

    // ========== Operator Records ==========

    pub fn rest_requests(&self) -> String {
        self.child("rest_requests")
    }

    /// A single rest request document.
    pub fn rest_request(&self, request_id: &str) -> String {
        format!("{}/{request_id}", self.rest_requests())
    }

    /// Status field of a rest request. Decisions write only this leaf.
    pub fn rest_request_status(&self, request_id: &str) -> String {
        format!("{}/status", self.rest_request(request_id))
    }

    pub fn commands(&self) -> String {
        self.child("commands")
    }

    pub fn notifications(&self) -> String {
        self.child("notifications")
    }

    // ========== Backend Feeds ==========

    pub fn recommendations(&self) -> String {
        self.child("recommendations")
    }

    pub fn environment(&self) -> String {
        self.child("env")
    }
}
