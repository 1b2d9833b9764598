// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Telemetry Subscriber
//!
//! Subscribes to every site path the service reads, resolves each update
//! and republishes the fused [`SiteSnapshot`] on a `watch` channel.
//!
//! ## Encrypted streams
//!
//! Vitals and edge intelligence arrive as [`StreamPayload`]s:
//!
//! | Payload | Snapshot | Tamper flag |
//! |---------|----------|-------------|
//! | absent | cleared | unchanged |
//! | legacy plaintext | replaced | unchanged |
//! | envelope, authentic | replaced | cleared |
//! | envelope, tag mismatch | cleared | set |
//! | envelope, bad version or malformed | cleared | unchanged |
//! | envelope, authentic but not a JSON object | cleared | cleared |
//!
//! A tampered stream is never shown with stale or forged data. Any JSON
//! object is a usable snapshot; fields of an unexpected type are carried
//! through untouched rather than rejecting the update.
//!
//! ## Task model
//!
//! One task per subscription `select!`s over all path feeds, the startup
//! grace timer and the cancellation token, so state is only ever touched
//! sequentially. Once [`TelemetrySubscription::stop`] returns the task and
//! its sender are gone and nothing more is published.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::crypto::{decrypt, DecryptError, DecryptionKey};
use super::envelope::{decode, is_encrypted, DecodeError, EncryptedEnvelope};
use super::snapshot::SiteSnapshot;
use crate::models::{
    DeviceStatus, EdgeIntelligenceSnapshot, EnvironmentReadings, Machine, Notification,
    Recommendation, RecommendationFeed, RestRequest, VitalsSnapshot, Worker,
};
use crate::paths::SitePaths;
use crate::risk::fuse_fleet;
use crate::store::RealtimeStore;

/// Default time after which the site is reported ready without any device data.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Notifications kept in a snapshot.
pub const NOTIFICATION_HISTORY: usize = 50;

/// Classification of a present stream value, resolved once per update.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// Legacy unencrypted telemetry.
    Plaintext(Value),
    Encrypted(EncryptedEnvelope),
    /// Shaped like an envelope but undecodable.
    Unencryptable(DecodeError),
}

impl StreamPayload {
    pub fn classify(raw: &Value) -> Self {
        if !is_encrypted(raw) {
            return StreamPayload::Plaintext(raw.clone());
        }
        match decode(raw) {
            Ok(envelope) => StreamPayload::Encrypted(envelope),
            Err(e) => StreamPayload::Unencryptable(e),
        }
    }
}

/// What one update does to an encrypted stream. `None` flags are left as
/// they were.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResolution<T> {
    pub snapshot: Option<T>,
    pub encrypted: Option<bool>,
    pub tampered: Option<bool>,
}

impl<T> StreamResolution<T> {
    fn cleared(encrypted: Option<bool>, tampered: Option<bool>) -> Self {
        Self {
            snapshot: None,
            encrypted,
            tampered,
        }
    }
}

/// Resolve one update of an encrypted stream. Pure apart from logging.
pub fn resolve_stream<T: DeserializeOwned>(
    stream: &str,
    raw: Option<&Value>,
    key: &DecryptionKey,
) -> StreamResolution<T> {
    let Some(raw) = raw else {
        return StreamResolution::cleared(None, None);
    };

    match StreamPayload::classify(raw) {
        StreamPayload::Plaintext(value) => match serde_json::from_value(value) {
            Ok(snapshot) => StreamResolution {
                snapshot: Some(snapshot),
                encrypted: Some(false),
                tampered: None,
            },
            Err(e) => {
                warn!(stream, error = %e, "Discarding plaintext telemetry that is not an object");
                StreamResolution::cleared(Some(false), None)
            }
        },
        StreamPayload::Unencryptable(e) => {
            warn!(stream, error = %e, "Discarding malformed envelope");
            StreamResolution::cleared(Some(true), None)
        }
        StreamPayload::Encrypted(envelope) => match decrypt(&envelope, key) {
            Ok(plaintext) => match serde_json::from_value(plaintext) {
                Ok(snapshot) => StreamResolution {
                    snapshot: Some(snapshot),
                    encrypted: Some(true),
                    tampered: Some(false),
                },
                Err(e) => {
                    error!(stream, error = %e, "Authenticated telemetry is not a JSON object");
                    StreamResolution::cleared(Some(true), Some(false))
                }
            },
            Err(DecryptError::Tamper) => {
                error!(stream, "Telemetry failed authentication; possible tampering");
                StreamResolution::cleared(Some(true), Some(true))
            }
            Err(DecryptError::PayloadFormat(e)) => {
                error!(stream, error = %e, "Authenticated telemetry is not valid JSON");
                StreamResolution::cleared(Some(true), Some(false))
            }
            Err(e @ DecryptError::UnsupportedVersion(_)) => {
                warn!(stream, error = %e, "Telemetry stream unavailable");
                StreamResolution::cleared(Some(true), None)
            }
        },
    }
}

/// Builds and starts [`TelemetrySubscription`]s.
pub struct TelemetrySubscriber {
    store: Arc<dyn RealtimeStore>,
    key: Arc<DecryptionKey>,
    paths: SitePaths,
    grace_period: Duration,
}

impl TelemetrySubscriber {
    pub fn new(store: Arc<dyn RealtimeStore>, key: Arc<DecryptionKey>, paths: SitePaths) -> Self {
        Self {
            store,
            key,
            paths,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Subscribe to every site path and spawn the fusion task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> TelemetrySubscription {
        let mut feeds = StreamMap::new();
        let mut listeners = Vec::new();

        for feed in Feed::ALL {
            let (receiver, guard) = self.store.subscribe(&feed.path(&self.paths)).into_parts();
            feeds.insert(feed, WatchStream::from_changes(receiver));
            listeners.extend(guard);
        }

        let (tx, rx) = watch::channel(Arc::new(SiteSnapshot::default()));
        let token = CancellationToken::new();

        let task = FusionTask {
            key: self.key.clone(),
            state: SiteSnapshot::default(),
            tx,
            _listeners: listeners,
        };
        let handle = tokio::spawn(task.run(feeds, self.grace_period, token.clone()));

        info!(
            site = %self.paths.root(),
            grace_ms = self.grace_period.as_millis() as u64,
            "Telemetry subscription started"
        );

        TelemetrySubscription {
            updates: rx,
            token,
            handle: Some(handle),
        }
    }
}

/// A running subscription. Dropping it cancels the task without waiting.
pub struct TelemetrySubscription {
    updates: watch::Receiver<Arc<SiteSnapshot>>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TelemetrySubscription {
    /// A receiver of fused snapshots.
    pub fn updates(&self) -> watch::Receiver<Arc<SiteSnapshot>> {
        self.updates.clone()
    }

    pub fn current(&self) -> Arc<SiteSnapshot> {
        self.updates.borrow().clone()
    }

    /// Stop the task and release every store listener.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Telemetry task ended abnormally");
            }
        }
        info!("Telemetry subscription stopped");
    }
}

impl Drop for TelemetrySubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Feed {
    Vitals,
    EdgeIntelligence,
    DeviceStatus,
    Workers,
    Machines,
    RestRequests,
    Recommendations,
    Notifications,
    Environment,
}

impl Feed {
    const ALL: [Feed; 9] = [
        Feed::Vitals,
        Feed::EdgeIntelligence,
        Feed::DeviceStatus,
        Feed::Workers,
        Feed::Machines,
        Feed::RestRequests,
        Feed::Recommendations,
        Feed::Notifications,
        Feed::Environment,
    ];

    fn path(self, paths: &SitePaths) -> String {
        match self {
            Feed::Vitals => paths.vitals(),
            Feed::EdgeIntelligence => paths.edge_intelligence(),
            Feed::DeviceStatus => paths.device_status(),
            Feed::Workers => paths.workers(),
            Feed::Machines => paths.machines(),
            Feed::RestRequests => paths.rest_requests(),
            Feed::Recommendations => paths.recommendations(),
            Feed::Notifications => paths.notifications(),
            Feed::Environment => paths.environment(),
        }
    }

    fn is_device_stream(self) -> bool {
        matches!(self, Feed::Vitals | Feed::EdgeIntelligence | Feed::DeviceStatus)
    }
}

struct FusionTask {
    key: Arc<DecryptionKey>,
    state: SiteSnapshot,
    tx: watch::Sender<Arc<SiteSnapshot>>,
    _listeners: Vec<DropGuard>,
}

impl FusionTask {
    async fn run(
        mut self,
        mut feeds: StreamMap<Feed, WatchStream<Option<Value>>>,
        grace_period: Duration,
        token: CancellationToken,
    ) {
        let grace = tokio::time::sleep(grace_period);
        tokio::pin!(grace);
        let mut feeds_open = true;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = &mut grace, if self.state.loading => {
                    info!("No device data within grace period; reporting ready");
                    self.state.loading = false;
                    self.publish();
                }
                item = feeds.next(), if feeds_open => match item {
                    Some((feed, raw)) => {
                        self.apply(feed, raw);
                        self.publish();
                    }
                    None => {
                        warn!("All store feeds closed");
                        feeds_open = false;
                    }
                },
            }
        }

        debug!("Telemetry task exiting");
    }

    fn publish(&self) {
        self.tx.send_replace(Arc::new(self.state.clone()));
    }

    fn apply(&mut self, feed: Feed, raw: Option<Value>) {
        let state = &mut self.state;
        match feed {
            Feed::Vitals => {
                let update: StreamResolution<VitalsSnapshot> =
                    resolve_stream("vitals", raw.as_ref(), &self.key);
                state.vitals = update.snapshot;
                if let Some(encrypted) = update.encrypted {
                    state.security.vitals_encrypted = encrypted;
                }
                if let Some(tampered) = update.tampered {
                    state.security.vitals_tampered = tampered;
                }
                state.security.refresh();
            }
            Feed::EdgeIntelligence => {
                let update: StreamResolution<EdgeIntelligenceSnapshot> =
                    resolve_stream("edge_intelligence", raw.as_ref(), &self.key);
                state.edge_intelligence = update.snapshot;
                if let Some(encrypted) = update.encrypted {
                    state.security.edge_encrypted = encrypted;
                }
                if let Some(tampered) = update.tampered {
                    state.security.edge_tampered = tampered;
                }
                state.security.refresh();
            }
            Feed::DeviceStatus => {
                state.device_status = raw.map(DeviceStatus);
            }
            Feed::Workers => {
                state.workers = parse_registry("workers", raw, |worker: &mut Worker, key| {
                    if worker.worker_id.is_empty() {
                        worker.worker_id = key.to_string();
                    }
                });
                state.risk = fuse_fleet(&state.workers, &state.machines);
            }
            Feed::Machines => {
                state.machines = parse_registry("machines", raw, |machine: &mut Machine, key| {
                    if machine.machine_id.is_empty() {
                        machine.machine_id = key.to_string();
                    }
                });
                state.risk = fuse_fleet(&state.workers, &state.machines);
            }
            Feed::RestRequests => {
                state.rest_requests = parse_registry("rest_requests", raw, |_: &mut RestRequest, _| {});
            }
            Feed::Recommendations => {
                let feed = parse_recommendations(raw);
                let mut alerts = feed.alerts;
                alerts.sort_by_key(|a| a.severity.rank());
                state.alert_count = feed.count.filter(|c| *c > 0).unwrap_or(alerts.len());
                state.alerts = alerts;
            }
            Feed::Notifications => {
                let registry = parse_registry("notifications", raw, |n: &mut Notification, key| {
                    if n.id.is_empty() {
                        n.id = key.to_string();
                    }
                });
                let mut notifications: Vec<Notification> = registry.into_values().collect();
                notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                notifications.truncate(NOTIFICATION_HISTORY);
                state.notifications = notifications;
            }
            Feed::Environment => {
                // keeps the last known readings while the path is empty
                if let Some(env) = parse_document::<EnvironmentReadings>("env", raw) {
                    state.environment = env;
                }
            }
        }

        if state.loading && feed.is_device_stream() {
            debug!("First device update received");
            state.loading = false;
        }
    }
}

fn parse_document<T: DeserializeOwned>(feed: &str, raw: Option<Value>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_value(raw) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(feed, error = %e, "Ignoring unparsable document");
            None
        }
    }
}

/// `site/recommendations` before its alerts are checked one by one.
#[derive(Deserialize)]
struct RawRecommendationFeed {
    #[serde(default)]
    alerts: Value,
    #[serde(default)]
    count: Value,
}

/// Parse the recommendations document, keeping every alert that fits and
/// skipping the rest.
fn parse_recommendations(raw: Option<Value>) -> RecommendationFeed {
    let Some(doc) = parse_document::<RawRecommendationFeed>("recommendations", raw) else {
        return RecommendationFeed::default();
    };

    let entries = match doc.alerts {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    let alerts = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Recommendation>(entry) {
            Ok(alert) => Some(alert),
            Err(e) => {
                debug!(index, error = %e, "Skipping malformed recommendation");
                None
            }
        })
        .collect();

    RecommendationFeed {
        alerts,
        count: doc.count.as_u64().and_then(|c| usize::try_from(c).ok()),
    }
}

/// Parse a keyed collection, skipping entries that do not fit `T`.
fn parse_registry<T: DeserializeOwned>(
    feed: &str,
    raw: Option<Value>,
    fill_key: impl Fn(&mut T, &str),
) -> BTreeMap<String, T> {
    let Some(Value::Object(entries)) = raw else {
        return BTreeMap::new();
    };

    entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<T>(value) {
            Ok(mut entry) => {
                fill_key(&mut entry, &key);
                Some((key, entry))
            }
            Err(e) => {
                debug!(feed, key = %key, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}
