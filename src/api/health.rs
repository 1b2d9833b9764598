// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "loading").
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyChecks {
    /// Telemetry subscription has finished its startup phase.
    pub telemetry: String,
    /// Per-stream availability ("online" or "offline").
    pub vitals: String,
    pub edge_intelligence: String,
    pub device_status: String,
}

fn online(flag: bool) -> String {
    if flag { "online" } else { "offline" }.to_string()
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 503 until the telemetry subscription has received its first
/// device update or the startup grace period has passed. Offline device
/// streams do not make the service unready.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Telemetry still loading", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let snapshot = state.snapshot();
    let ready = !snapshot.loading;

    let response = ReadyResponse {
        status: if ready { "ok" } else { "loading" }.to_string(),
        checks: ReadyChecks {
            telemetry: if ready { "ok" } else { "loading" }.to_string(),
            vitals: online(snapshot.vitals_online()),
            edge_intelligence: online(snapshot.edge_online()),
            device_status: online(snapshot.device_online()),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
