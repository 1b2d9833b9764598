// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Immutable fused view of one site.
//!
//! The subscriber publishes a fresh `Arc<SiteSnapshot>` after every update;
//! a snapshot never changes once handed out.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{
    DeviceStatus, EdgeIntelligenceSnapshot, EnvironmentReadings, Machine, Notification,
    Recommendation, RestRequest, RestRequestStatus, VitalsSnapshot, Worker,
};
use crate::risk::WorkerRisk;

/// Outcome of the most recent decode on each encrypted stream.
///
/// Flags change only when a stream delivers a new value; they never expire.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct SecurityStatus {
    pub vitals_encrypted: bool,
    pub edge_encrypted: bool,
    pub vitals_tampered: bool,
    pub edge_tampered: bool,
    /// Either stream failed authentication on its last update.
    pub tamper_detected: bool,
}

impl SecurityStatus {
    pub(crate) fn refresh(&mut self) {
        self.tamper_detected = self.vitals_tampered || self.edge_tampered;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSnapshot {
    /// True until the first device stream reports or the grace period ends.
    pub loading: bool,
    pub vitals: Option<VitalsSnapshot>,
    pub edge_intelligence: Option<EdgeIntelligenceSnapshot>,
    pub device_status: Option<DeviceStatus>,
    pub security: SecurityStatus,
    pub workers: BTreeMap<String, Worker>,
    pub machines: BTreeMap<String, Machine>,
    /// Fleet risk table in display order.
    pub risk: Vec<WorkerRisk>,
    pub rest_requests: BTreeMap<String, RestRequest>,
    /// Backend recommendations, CRITICAL first.
    pub alerts: Vec<Recommendation>,
    pub alert_count: usize,
    /// Newest first, capped.
    pub notifications: Vec<Notification>,
    pub environment: EnvironmentReadings,
}

impl Default for SiteSnapshot {
    fn default() -> Self {
        Self {
            loading: true,
            vitals: None,
            edge_intelligence: None,
            device_status: None,
            security: SecurityStatus::default(),
            workers: BTreeMap::new(),
            machines: BTreeMap::new(),
            risk: Vec::new(),
            rest_requests: BTreeMap::new(),
            alerts: Vec::new(),
            alert_count: 0,
            notifications: Vec::new(),
            environment: EnvironmentReadings::default(),
        }
    }
}

impl SiteSnapshot {
    pub fn vitals_online(&self) -> bool {
        self.vitals.is_some()
    }

    pub fn edge_online(&self) -> bool {
        self.edge_intelligence.is_some()
    }

    pub fn device_online(&self) -> bool {
        self.device_status.is_some()
    }

    /// Pending rest requests, keyed by request id.
    pub fn pending_rest_requests(&self) -> impl Iterator<Item = (&String, &RestRequest)> {
        self.rest_requests
            .iter()
            .filter(|(_, r)| r.status == RestRequestStatus::Pending)
    }

    pub fn pending_rest_count(&self) -> usize {
        self.pending_rest_requests().count()
    }

    pub fn risk_for(&self, worker_id: &str) -> Option<&WorkerRisk> {
        self.risk.iter().find(|row| row.worker_id == worker_id)
    }

    pub fn alert(&self, alert_id: &str) -> Option<&Recommendation> {
        self.alerts.iter().find(|a| a.id == alert_id)
    }

    /// Notifications newer than `window_ms` relative to `now_ms`, at most
    /// `limit` of them.
    pub fn recent_notifications(&self, now_ms: i64, window_ms: i64, limit: usize) -> Vec<&Notification> {
        self.notifications
            .iter()
            .filter(|n| now_ms.saturating_sub(n.timestamp) < window_ms)
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn request(status: RestRequestStatus) -> RestRequest {
        RestRequest {
            worker_id: "W1".into(),
            machine_id: None,
            reason: Some("dizzy".into()),
            timestamp: None,
            status,
        }
    }

    fn notification(id: &str, timestamp: i64) -> Notification {
        Notification {
            id: id.into(),
            timestamp,
            severity: Severity::Critical,
            message: "gas".into(),
            target_type: None,
            target_id: None,
        }
    }

    #[test]
    fn default_is_loading_and_offline() {
        let snapshot = SiteSnapshot::default();
        assert!(snapshot.loading);
        assert!(!snapshot.vitals_online());
        assert!(!snapshot.edge_online());
        assert!(!snapshot.device_online());
        assert!(!snapshot.security.tamper_detected);
        assert_eq!(snapshot.environment.weather, "Clear");
    }

    #[test]
    fn pending_requests_are_filtered() {
        let mut snapshot = SiteSnapshot::default();
        snapshot.rest_requests.insert("r1".into(), request(RestRequestStatus::Pending));
        snapshot.rest_requests.insert("r2".into(), request(RestRequestStatus::Approved));
        snapshot.rest_requests.insert("r3".into(), request(RestRequestStatus::Pending));

        let ids: Vec<&str> = snapshot.pending_rest_requests().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
        assert_eq!(snapshot.pending_rest_count(), 2);
    }

    #[test]
    fn recent_notifications_respect_window_and_limit() {
        let mut snapshot = SiteSnapshot::default();
        snapshot.notifications = vec![
            notification("n4", 10_000),
            notification("n3", 9_000),
            notification("n2", 8_000),
            notification("n1", 1_000),
        ];

        let recent = snapshot.recent_notifications(12_000, 5_000, 10);
        let ids: Vec<&str> = recent.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n4", "n3", "n2"]);

        assert_eq!(snapshot.recent_notifications(12_000, 5_000, 1).len(), 1);
    }

    #[test]
    fn extreme_notification_timestamps_do_not_overflow() {
        let mut snapshot = SiteSnapshot::default();
        snapshot.notifications = vec![
            notification("ancient", i64::MIN),
            notification("far_future", i64::MAX),
            notification("fresh", 1_760_000_000_000),
        ];

        let recent = snapshot.recent_notifications(1_760_000_001_000, 5_000, 3);
        let ids: Vec<&str> = recent.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["far_future", "fresh"]);
    }

    #[test]
    fn tamper_flag_is_the_disjunction() {
        let mut security = SecurityStatus {
            edge_tampered: true,
            ..SecurityStatus::default()
        };
        security.refresh();
        assert!(security.tamper_detected);

        security.edge_tampered = false;
        security.refresh();
        assert!(!security.tamper_detected);
    }
}
