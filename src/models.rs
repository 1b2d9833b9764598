// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Site Data Models
//!
//! Typed views of the documents stored under the site root of the realtime
//! store. All types derive `Serialize`, `Deserialize`, and `ToSchema` so the
//! same structures flow from the store into the fusion engine and out through
//! the HTTP API.
//!
//! ## Model Categories
//!
//! - **Registries**: [`Worker`] and [`Machine`] documents keyed by id
//! - **Device streams**: [`VitalsSnapshot`], [`EdgeIntelligenceSnapshot`], [`DeviceStatus`]
//! - **Operator records**: [`RestRequest`], [`CommandRecord`], [`Notification`]
//! - **Backend feeds**: [`Recommendation`], [`EnvironmentReadings`]
//!
//! Numeric telemetry fields are optional. A reading the device never sent is
//! `None`, which is not the same thing as a reading of zero.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

// =============================================================================
// Shared Enums
// =============================================================================

/// Severity attached to commands, alerts and notifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Display rank: critical items sort first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

/// What a command or alert is aimed at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Worker,
    Machine,
    Site,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Worker => "worker",
            TargetType::Machine => "machine",
            TargetType::Site => "site",
        }
    }
}

// =============================================================================
// Registries
// =============================================================================

/// A worker document from `site/workers/{worker_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Worker {
    #[serde(default)]
    pub worker_id: String,
    /// Machine the worker is currently operating, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<f64>,
    /// Heart-rate variability. Lower values indicate more strain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatigue_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_percent: Option<f64>,
    /// Score reported by the upstream simulator; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cis_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cis_risk_level: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// A machine document from `site/machines/{machine_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Machine {
    #[serde(default)]
    pub machine_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_rpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coolant_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oil_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hydraulic_pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<f64>,
    /// Accumulated wear, nominally 0..=1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<f64>,
    /// Load/thermal stress, 0..=100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration_mm_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_mode: Option<String>,
    /// Active diagnostic trouble codes.
    #[serde(default)]
    pub fault_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Machine {
    pub fn has_active_fault(&self) -> bool {
        !self.fault_codes.is_empty()
    }
}

// =============================================================================
// Device Streams
// =============================================================================

/// Wearable readings from `site/iot/vitals`.
///
/// Any JSON object is accepted. Fields the dashboard does not know about,
/// and known fields carrying an unexpected type, are kept in `extra` so
/// device payloads pass through unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(from = "Map<String, Value>")]
pub struct VitalsSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_temp_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_humidity_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_ppm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tilt_angle_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_rssi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_s: Option<f64>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for VitalsSnapshot {
    fn from(document: Map<String, Value>) -> Self {
        let mut doc = LooseFields(document);
        Self {
            heart_rate_bpm: doc.number("heart_rate_bpm"),
            body_temp_c: doc.number("body_temp_c"),
            ambient_humidity_pct: doc.number("ambient_humidity_pct"),
            gas_ppm: doc.number("gas_ppm"),
            vibration_g: doc.number("vibration_g"),
            tilt_angle_deg: doc.number("tilt_angle_deg"),
            accel_x: doc.number("accel_x"),
            accel_y: doc.number("accel_y"),
            accel_z: doc.number("accel_z"),
            wifi_rssi: doc.number("wifi_rssi"),
            uptime_s: doc.number("uptime_s"),
            extra: doc.0,
        }
    }
}

/// Edge-computed signals from `site/iot/edge_intelligence`. Parsed as
/// leniently as [`VitalsSnapshot`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(from = "Map<String, Value>")]
pub struct EdgeIntelligenceSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cis_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cis_risk_level: Option<String>,
    /// Predictive-maintenance health, 0..=100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdm_health_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdm_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatigue_estimated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress_estimated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_machine_load: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_machine_stress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_feed_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wearable_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_on: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl From<Map<String, Value>> for EdgeIntelligenceSnapshot {
    fn from(document: Map<String, Value>) -> Self {
        let mut doc = LooseFields(document);
        Self {
            cis_score: doc.number("cis_score"),
            cis_risk_level: doc.text("cis_risk_level"),
            pdm_health_score: doc.number("pdm_health_score"),
            pdm_status: doc.text("pdm_status"),
            fatigue_estimated: doc.number("fatigue_estimated"),
            stress_estimated: doc.number("stress_estimated"),
            input_machine_load: doc.number("input_machine_load"),
            input_machine_stress: doc.number("input_machine_stress"),
            machine_feed_active: doc.flag("machine_feed_active"),
            wearable_connected: doc.flag("wearable_connected"),
            computed_on: doc.text("computed_on"),
            extra: doc.0,
        }
    }
}

/// A device document being split into typed fields. A field is only taken
/// out when it has the expected type; anything else stays behind.
struct LooseFields(Map<String, Value>);

impl LooseFields {
    fn number(&mut self, key: &str) -> Option<f64> {
        self.take(key, Value::as_f64)
    }

    fn flag(&mut self, key: &str) -> Option<bool> {
        self.take(key, Value::as_bool)
    }

    fn text(&mut self, key: &str) -> Option<String> {
        self.take(key, |v| v.as_str().map(str::to_string))
    }

    fn take<T>(&mut self, key: &str, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        let typed = convert(self.0.get(key)?)?;
        self.0.remove(key);
        Some(typed)
    }
}

/// Device heartbeat document from `site/iot/status`. Never encrypted and
/// passed through as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct DeviceStatus(pub Value);

// =============================================================================
// Operator Records
// =============================================================================

/// Lifecycle of a rest request. Transitions out of `Pending` exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestRequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RestRequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RestRequestStatus::Pending => "PENDING",
            RestRequestStatus::Approved => "APPROVED",
            RestRequestStatus::Denied => "DENIED",
        }
    }
}

/// An operator-initiated rest request from `site/rest_requests/{request_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct RestRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub status: RestRequestStatus,
}

/// Status carried by a command record. The dashboard only ever writes
/// `Pending`; devices may advance it to values this service does not track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Pending,
    #[serde(other)]
    Other,
}

/// A command written to `site/commands/{command_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CommandRecord {
    pub action: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub severity: Severity,
    pub source: String,
    pub duration_s: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub status: CommandStatus,
}

/// Operator request to dispatch a command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct CommandRequest {
    pub action: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub severity: Severity,
    pub duration_s: u32,
}

/// A toast-style notification from `site/notifications/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Notification {
    /// Falls back to the store key when the document does not carry one.
    #[serde(default)]
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<TargetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

// =============================================================================
// Backend Feeds
// =============================================================================

/// A supervisor recommendation produced by the backend alerts engine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Recommendation {
    pub id: String,
    /// Milliseconds since the Unix epoch (may be fractional).
    #[serde(default)]
    pub timestamp: f64,
    pub severity: Severity,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: Value,
    #[serde(default)]
    pub threshold: f64,
    pub action: String,
    #[serde(default)]
    pub message: String,
}

/// The `site/recommendations` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationFeed {
    #[serde(default)]
    pub alerts: Vec<Recommendation>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// Site weather from `site/env`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct EnvironmentReadings {
    pub ambient_temp_c: f64,
    pub humidity_pct: f64,
    pub weather: String,
    pub wind_speed_kmh: f64,
}

impl Default for EnvironmentReadings {
    fn default() -> Self {
        Self {
            ambient_temp_c: 30.0,
            humidity_pct: 55.0,
            weather: "Clear".to_string(),
            wind_speed_kmh: 8.0,
        }
    }
}
