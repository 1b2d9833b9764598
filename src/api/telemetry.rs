// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read endpoints over the live fused site view.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    models::{
        DeviceStatus, EdgeIntelligenceSnapshot, EnvironmentReadings, Notification, Recommendation,
        RestRequest, VitalsSnapshot,
    },
    risk::WorkerRisk,
    state::AppState,
    telemetry::SecurityStatus,
};

/// Only notifications this recent are shown (prevents a flood on reconnect).
pub const DEFAULT_NOTIFICATION_WINDOW_MS: i64 = 5_000;
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 3;

#[derive(Debug, Serialize, ToSchema)]
pub struct StreamAvailability {
    pub vitals: bool,
    pub edge_intelligence: bool,
    pub device_status: bool,
}

/// Device streams with their security state.
#[derive(Debug, Serialize, ToSchema)]
pub struct IotResponse {
    pub loading: bool,
    pub vitals: Option<VitalsSnapshot>,
    pub edge_intelligence: Option<EdgeIntelligenceSnapshot>,
    pub device_status: Option<DeviceStatus>,
    pub online: StreamAvailability,
    pub security: SecurityStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    /// CRITICAL first, then WARNING, then INFO.
    pub alerts: Vec<Recommendation>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingRestRequest {
    pub request_id: String,
    #[serde(flatten)]
    pub request: RestRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestRequestsResponse {
    pub pending: Vec<PendingRestRequest>,
    pub pending_count: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationQuery {
    /// Maximum age in milliseconds (default 5000).
    pub within_ms: Option<i64>,
    /// Maximum number returned (default 3).
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v1/iot",
    tag = "Telemetry",
    responses((status = 200, body = IotResponse))
)]
pub async fn get_iot(State(state): State<AppState>) -> Json<IotResponse> {
    let snapshot = state.snapshot();
    Json(IotResponse {
        loading: snapshot.loading,
        vitals: snapshot.vitals.clone(),
        edge_intelligence: snapshot.edge_intelligence.clone(),
        device_status: snapshot.device_status.clone(),
        online: StreamAvailability {
            vitals: snapshot.vitals_online(),
            edge_intelligence: snapshot.edge_online(),
            device_status: snapshot.device_online(),
        },
        security: snapshot.security,
    })
}

#[utoipa::path(
    get,
    path = "/v1/risk",
    tag = "Risk",
    responses((status = 200, body = [WorkerRisk]))
)]
pub async fn list_risk(State(state): State<AppState>) -> Json<Vec<WorkerRisk>> {
    Json(state.snapshot().risk.clone())
}

#[utoipa::path(
    get,
    path = "/v1/workers/{worker_id}/risk",
    params(
        ("worker_id" = String, Path, description = "Worker identifier")
    ),
    tag = "Risk",
    responses(
        (status = 200, body = WorkerRisk),
        (status = 404, description = "Unknown worker")
    )
)]
pub async fn get_worker_risk(
    Path(worker_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WorkerRisk>, ApiError> {
    state
        .snapshot()
        .risk_for(&worker_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("worker `{worker_id}` not found")))
}

#[utoipa::path(
    get,
    path = "/v1/alerts",
    tag = "Alerts",
    responses((status = 200, body = AlertsResponse))
)]
pub async fn list_alerts(State(state): State<AppState>) -> Json<AlertsResponse> {
    let snapshot = state.snapshot();
    Json(AlertsResponse {
        alerts: snapshot.alerts.clone(),
        count: snapshot.alert_count,
    })
}

#[utoipa::path(
    get,
    path = "/v1/rest-requests",
    tag = "Rest Requests",
    responses((status = 200, body = RestRequestsResponse))
)]
pub async fn list_rest_requests(State(state): State<AppState>) -> Json<RestRequestsResponse> {
    let snapshot = state.snapshot();
    let pending: Vec<PendingRestRequest> = snapshot
        .pending_rest_requests()
        .map(|(id, request)| PendingRestRequest {
            request_id: id.clone(),
            request: request.clone(),
        })
        .collect();
    Json(RestRequestsResponse {
        pending_count: pending.len(),
        pending,
    })
}

#[utoipa::path(
    get,
    path = "/v1/notifications",
    params(NotificationQuery),
    tag = "Notifications",
    responses((status = 200, body = [Notification]))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> Json<Vec<Notification>> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let within = query.within_ms.unwrap_or(DEFAULT_NOTIFICATION_WINDOW_MS);
    let limit = query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT);

    let snapshot = state.snapshot();
    Json(
        snapshot
            .recent_notifications(now_ms, within, limit)
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/v1/environment",
    tag = "Telemetry",
    responses((status = 200, body = EnvironmentReadings))
)]
pub async fn get_environment(State(state): State<AppState>) -> Json<EnvironmentReadings> {
    Json(state.snapshot().environment.clone())
}
