// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Command and Alert Dispatcher
//!
//! Turns operator decisions into records in the realtime store:
//!
//! | Operation | Writes |
//! |-----------|--------|
//! | [`CommandDispatcher::dispatch_command`] | one `PENDING` command |
//! | [`CommandDispatcher::resolve_rest_request`] | request status, plus a mandatory break command on approval |
//! | [`CommandDispatcher::dispatch_recommendation`] | one `PENDING` command from a backend alert |
//! | [`CommandDispatcher::notify`] | one notification |
//!
//! ## Debounce
//!
//! Repeated submissions of the same action inside a short window are
//! rejected with [`DispatchError::Debounced`]. This stops double clicks and
//! client retries from queueing duplicate commands; it is not a
//! transactional guarantee across processes. A claim is released again when
//! the write it guarded fails.
//!
//! Writes are never retried here. A failed write is an error for the caller
//! and nothing already written is rolled back.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    CommandRecord, CommandRequest, CommandStatus, Notification, Recommendation, RestRequest,
    RestRequestStatus, Severity, TargetType,
};
use crate::paths::SitePaths;
use crate::store::{RealtimeStore, StoreError};

/// Action written when a rest request is approved.
pub const MANDATORY_BREAK_ACTION: &str = "ASSIGN 15-MIN MANDATORY BREAK";

/// Length of the mandatory break in seconds.
pub const MANDATORY_BREAK_DURATION_S: u32 = 900;

/// Default `source` on every record this service writes.
pub const DEFAULT_COMMAND_SOURCE: &str = "web_dashboard";

pub const COMMAND_DEBOUNCE: Duration = Duration::from_secs(3);
pub const DECISION_DEBOUNCE: Duration = Duration::from_secs(4);

const DEBOUNCE_CAPACITY: usize = 1024;

/// Errors from dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("duplicate submission for `{0}`; try again shortly")]
    Debounced(String),

    #[error("rest request `{0}` not found")]
    NotFound(String),

    #[error("rest request `{request_id}` is already {}", .status.as_str())]
    AlreadyResolved {
        request_id: String,
        status: RestRequestStatus,
    },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("rest request `{request_id}` is malformed: {reason}")]
    Malformed { request_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The approval was recorded but its break command was not.
    #[error("rest request `{request_id}` approved but the break command failed: {source}")]
    CommandWriteFailed {
        request_id: String,
        source: StoreError,
    },
}

/// Store-assigned key of a written command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operator decision on a rest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestDecision {
    Approve,
    Deny,
}

impl RestDecision {
    pub fn status(self) -> RestRequestStatus {
        match self {
            RestDecision::Approve => RestRequestStatus::Approved,
            RestDecision::Deny => RestRequestStatus::Denied,
        }
    }
}

/// Outcome of a rest request decision.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RestResolution {
    pub request_id: String,
    pub status: RestRequestStatus,
    /// Break command written on approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
}

/// Recently claimed keys, expiring after `window`.
struct Debouncer {
    recent: Mutex<LruCache<String, Instant>>,
    window: Duration,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            recent: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEBOUNCE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            window,
        }
    }

    /// Claim `key`. False when it was already claimed inside the window.
    fn try_claim(&self, key: &str) -> bool {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        if let Some(at) = recent.get(key) {
            if now.duration_since(*at) < self.window {
                return false;
            }
        }
        recent.put(key.to_string(), now);
        true
    }

    fn release(&self, key: &str) {
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        recent.pop(key);
    }
}

pub struct CommandDispatcher {
    store: Arc<dyn RealtimeStore>,
    paths: SitePaths,
    source: String,
    commands: Debouncer,
    decisions: Debouncer,
    recommendations: Debouncer,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn RealtimeStore>, paths: SitePaths, source: impl Into<String>) -> Self {
        Self {
            store,
            paths,
            source: source.into(),
            commands: Debouncer::new(COMMAND_DEBOUNCE),
            decisions: Debouncer::new(DECISION_DEBOUNCE),
            recommendations: Debouncer::new(COMMAND_DEBOUNCE),
        }
    }

    /// Dispatch an operator command, debounced per target and action.
    pub async fn dispatch_command(&self, request: CommandRequest) -> Result<CommandId, DispatchError> {
        validate(&request)?;

        let key = format!(
            "{}:{}:{}",
            request.target_type.as_str(),
            request.target_id,
            request.action
        );
        if !self.commands.try_claim(&key) {
            return Err(DispatchError::Debounced(key));
        }

        self.write_command(request).await.map_err(|e| {
            self.commands.release(&key);
            DispatchError::Store(e)
        })
    }

    /// Approve or deny a pending rest request.
    ///
    /// Approval also writes exactly one mandatory break command for the
    /// worker. The status write and the command write are independent: if
    /// the command fails after the status was recorded the error says so and
    /// the status stays as written.
    pub async fn resolve_rest_request(
        &self,
        request_id: &str,
        decision: RestDecision,
    ) -> Result<RestResolution, DispatchError> {
        if request_id.trim().is_empty() {
            return Err(DispatchError::Invalid("request id is empty".to_string()));
        }
        if request_id.contains('/') {
            return Err(DispatchError::Invalid(format!(
                "request id `{request_id}` must be a single path segment"
            )));
        }
        if !self.decisions.try_claim(request_id) {
            return Err(DispatchError::Debounced(request_id.to_string()));
        }

        let request = match self.load_pending(request_id).await {
            Ok(request) => request,
            Err(e) => {
                self.decisions.release(request_id);
                return Err(e);
            }
        };

        let status = decision.status();
        if let Err(e) = self
            .store
            .set(
                &self.paths.rest_request_status(request_id),
                serde_json::to_value(status).map_err(StoreError::from)?,
            )
            .await
        {
            self.decisions.release(request_id);
            return Err(e.into());
        }
        info!(request_id = %request_id, worker_id = %request.worker_id, status = status.as_str(), "Rest request resolved");

        let command_id = match decision {
            RestDecision::Deny => None,
            RestDecision::Approve => {
                let command = CommandRequest {
                    action: MANDATORY_BREAK_ACTION.to_string(),
                    target_type: TargetType::Worker,
                    target_id: request.worker_id.clone(),
                    severity: Severity::Warning,
                    duration_s: MANDATORY_BREAK_DURATION_S,
                };
                let id = self.write_command(command).await.map_err(|source| {
                    warn!(request_id = %request_id, error = %source, "Break command not written after approval");
                    DispatchError::CommandWriteFailed {
                        request_id: request_id.to_string(),
                        source,
                    }
                })?;
                Some(id)
            }
        };

        Ok(RestResolution {
            request_id: request_id.to_string(),
            status,
            command_id,
        })
    }

    /// Forward a backend recommendation as a command, debounced per alert.
    pub async fn dispatch_recommendation(&self, alert: &Recommendation) -> Result<CommandId, DispatchError> {
        if !self.recommendations.try_claim(&alert.id) {
            return Err(DispatchError::Debounced(alert.id.clone()));
        }

        let command = CommandRequest {
            action: alert.action.clone(),
            target_type: alert.target_type,
            target_id: alert.target_id.clone(),
            severity: alert.severity,
            duration_s: recommendation_duration(alert.severity),
        };
        if let Err(e) = validate(&command) {
            self.recommendations.release(&alert.id);
            return Err(e);
        }

        self.write_command(command).await.map_err(|e| {
            self.recommendations.release(&alert.id);
            DispatchError::Store(e)
        })
    }

    /// Publish a notification to the site feed.
    pub async fn notify(
        &self,
        severity: Severity,
        message: impl Into<String>,
        target: Option<(TargetType, String)>,
    ) -> Result<Notification, DispatchError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(DispatchError::Invalid("message is empty".to_string()));
        }

        let (target_type, target_id) = target.unzip();
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            timestamp: now_ms(),
            severity,
            message,
            target_type,
            target_id,
        };
        self.store
            .push(
                &self.paths.notifications(),
                serde_json::to_value(&notification).map_err(StoreError::from)?,
            )
            .await?;
        info!(notification_id = %notification.id, severity = severity.as_str(), "Notification published");
        Ok(notification)
    }

    /// Write a command without debouncing.
    pub async fn write_command(&self, request: CommandRequest) -> Result<CommandId, StoreError> {
        let record = CommandRecord {
            action: request.action,
            target_type: request.target_type,
            target_id: request.target_id,
            severity: request.severity,
            source: self.source.clone(),
            duration_s: request.duration_s,
            timestamp: now_ms(),
            status: CommandStatus::Pending,
        };

        let id = self
            .store
            .push(&self.paths.commands(), serde_json::to_value(&record)?)
            .await?;
        info!(
            command_id = %id,
            action = %record.action,
            target_type = record.target_type.as_str(),
            target_id = %record.target_id,
            severity = record.severity.as_str(),
            "Command dispatched"
        );
        Ok(CommandId(id))
    }

    async fn load_pending(&self, request_id: &str) -> Result<RestRequest, DispatchError> {
        let raw = self
            .store
            .get(&self.paths.rest_request(request_id))
            .await?
            .ok_or_else(|| DispatchError::NotFound(request_id.to_string()))?;

        let request: RestRequest =
            serde_json::from_value(raw).map_err(|e| DispatchError::Malformed {
                request_id: request_id.to_string(),
                reason: e.to_string(),
            })?;

        if request.status != RestRequestStatus::Pending {
            return Err(DispatchError::AlreadyResolved {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }
        Ok(request)
    }
}

/// Break length attached to forwarded recommendations.
pub fn recommendation_duration(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 180,
        _ => 120,
    }
}

fn validate(request: &CommandRequest) -> Result<(), DispatchError> {
    if request.action.trim().is_empty() {
        return Err(DispatchError::Invalid("action is empty".to_string()));
    }
    if request.target_id.trim().is_empty() {
        return Err(DispatchError::Invalid("target_id is empty".to_string()));
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
