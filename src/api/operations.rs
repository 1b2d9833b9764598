// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator action endpoints. Each one is a thin wrapper over the
//! [`CommandDispatcher`](crate::dispatch::CommandDispatcher).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dispatch::{CommandId, RestDecision, RestResolution},
    error::ApiError,
    models::{CommandRequest, Notification, Severity, TargetType},
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandDispatched {
    pub command_id: CommandId,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NotifyRequest {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub target_type: Option<TargetType>,
    #[serde(default)]
    pub target_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/rest-requests/{request_id}/approve",
    params(
        ("request_id" = String, Path, description = "Rest request identifier")
    ),
    tag = "Rest Requests",
    responses(
        (status = 200, description = "Approved; a mandatory break command was written", body = RestResolution),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Already resolved or submitted moments ago"),
        (status = 502, description = "Store write failed")
    )
)]
pub async fn approve_rest_request(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RestResolution>, ApiError> {
    let resolution = state
        .dispatcher
        .resolve_rest_request(&request_id, RestDecision::Approve)
        .await?;
    Ok(Json(resolution))
}

#[utoipa::path(
    post,
    path = "/v1/rest-requests/{request_id}/deny",
    params(
        ("request_id" = String, Path, description = "Rest request identifier")
    ),
    tag = "Rest Requests",
    responses(
        (status = 200, description = "Denied", body = RestResolution),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Already resolved or submitted moments ago"),
        (status = 502, description = "Store write failed")
    )
)]
pub async fn deny_rest_request(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RestResolution>, ApiError> {
    let resolution = state
        .dispatcher
        .resolve_rest_request(&request_id, RestDecision::Deny)
        .await?;
    Ok(Json(resolution))
}

#[utoipa::path(
    post,
    path = "/v1/commands",
    request_body = CommandRequest,
    tag = "Commands",
    responses(
        (status = 201, body = CommandDispatched),
        (status = 400, description = "Invalid command"),
        (status = 409, description = "Duplicate submission"),
        (status = 502, description = "Store write failed")
    )
)]
pub async fn dispatch_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandDispatched>), ApiError> {
    let command_id = state.dispatcher.dispatch_command(request).await?;
    Ok((StatusCode::CREATED, Json(CommandDispatched { command_id })))
}

#[utoipa::path(
    post,
    path = "/v1/alerts/{alert_id}/dispatch",
    params(
        ("alert_id" = String, Path, description = "Recommendation identifier")
    ),
    tag = "Alerts",
    responses(
        (status = 201, body = CommandDispatched),
        (status = 404, description = "No such active recommendation"),
        (status = 409, description = "Dispatched moments ago"),
        (status = 502, description = "Store write failed")
    )
)]
pub async fn dispatch_alert(
    Path(alert_id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CommandDispatched>), ApiError> {
    let snapshot = state.snapshot();
    let alert = snapshot
        .alert(&alert_id)
        .ok_or_else(|| ApiError::not_found(format!("alert `{alert_id}` not found")))?;

    let command_id = state.dispatcher.dispatch_recommendation(alert).await?;
    Ok((StatusCode::CREATED, Json(CommandDispatched { command_id })))
}

#[utoipa::path(
    post,
    path = "/v1/notifications",
    request_body = NotifyRequest,
    tag = "Notifications",
    responses(
        (status = 201, body = Notification),
        (status = 400, description = "Empty message or incomplete target"),
        (status = 502, description = "Store write failed")
    )
)]
pub async fn publish_notification(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    let target = match (request.target_type, request.target_id) {
        (Some(kind), Some(id)) => Some((kind, id)),
        (None, None) => None,
        _ => {
            return Err(ApiError::bad_request(
                "target_type and target_id must be given together",
            ))
        }
    };

    let notification = state
        .dispatcher
        .notify(request.severity, request.message, target)
        .await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{state_with_store, stored_commands};
    use crate::models::Recommendation;
    use crate::store::InMemoryStore;
    use crate::telemetry::SiteSnapshot;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn approve_then_approve_again_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("site/rest_requests/r1", json!({ "worker_id": "W3", "status": "PENDING" }))
            .unwrap();
        let state = state_with_store(SiteSnapshot::default(), store.clone());

        let Json(resolution) = approve_rest_request(Path("r1".into()), State(state.clone()))
            .await
            .expect("approval succeeds");
        assert!(resolution.command_id.is_some());
        assert_eq!(stored_commands(&store).len(), 1);

        let err = approve_rest_request(Path("r1".into()), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(stored_commands(&store).len(), 1);
    }

    #[tokio::test]
    async fn deny_unknown_request_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let state = state_with_store(SiteSnapshot::default(), store);

        let err = deny_rest_request(Path("nope".into()), State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatching_an_alert_uses_the_live_view() {
        let store = Arc::new(InMemoryStore::new());
        let alert: Recommendation = serde_json::from_value(json!({
            "id": "M1_temp_warning",
            "severity": "WARNING",
            "target_type": "machine",
            "target_id": "M1",
            "action": "REDUCE LOAD"
        }))
        .unwrap();
        let snapshot = SiteSnapshot {
            alerts: vec![alert],
            alert_count: 1,
            ..SiteSnapshot::default()
        };
        let state = state_with_store(snapshot, store.clone());

        let (status, _) = dispatch_alert(Path("M1_temp_warning".into()), State(state.clone()))
            .await
            .expect("dispatch succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stored_commands(&store)[0]["duration_s"], 120);

        let err = dispatch_alert(Path("gone".into()), State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_outage_is_a_bad_gateway() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes_under(Some("site/commands")).unwrap();
        let state = state_with_store(SiteSnapshot::default(), store);

        let request = CommandRequest {
            action: "EVACUATE".into(),
            target_type: TargetType::Site,
            target_id: "SITE".into(),
            severity: Severity::Critical,
            duration_s: 300,
        };
        let err = dispatch_command(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn notification_target_must_be_complete() {
        let store = Arc::new(InMemoryStore::new());
        let state = state_with_store(SiteSnapshot::default(), store.clone());

        let half = NotifyRequest {
            severity: Severity::Warning,
            message: "check M2".into(),
            target_type: Some(TargetType::Machine),
            target_id: None,
        };
        let err = publish_notification(State(state.clone()), Json(half.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let full = NotifyRequest {
            target_id: Some("M2".into()),
            ..half
        };
        let (status, Json(sent)) = publish_notification(State(state), Json(full))
            .await
            .expect("notification published");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent.target_id.as_deref(), Some("M2"));
        assert!(store.read("site/notifications").unwrap().is_some());
    }
}
