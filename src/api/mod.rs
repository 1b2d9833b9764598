// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    dispatch::{CommandId, RestResolution},
    models::{
        CommandRequest, DeviceStatus, EdgeIntelligenceSnapshot, EnvironmentReadings, Notification,
        Recommendation, RestRequest, RestRequestStatus, Severity, TargetType, VitalsSnapshot,
    },
    risk::{CompositeRiskResult, RiskLevel, WorkerRisk},
    state::AppState,
    telemetry::SecurityStatus,
};

pub mod health;
pub mod operations;
pub mod telemetry;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/iot", get(telemetry::get_iot))
        .route("/environment", get(telemetry::get_environment))
        .route("/risk", get(telemetry::list_risk))
        .route("/workers/{worker_id}/risk", get(telemetry::get_worker_risk))
        .route("/alerts", get(telemetry::list_alerts))
        .route("/alerts/{alert_id}/dispatch", post(operations::dispatch_alert))
        .route("/rest-requests", get(telemetry::list_rest_requests))
        .route(
            "/rest-requests/{request_id}/approve",
            post(operations::approve_rest_request),
        )
        .route(
            "/rest-requests/{request_id}/deny",
            post(operations::deny_rest_request),
        )
        .route("/commands", post(operations::dispatch_command))
        .route(
            "/notifications",
            get(telemetry::list_notifications).post(operations::publish_notification),
        );

    Router::new()
        .route("/health", get(health::liveness))
        .route("/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        telemetry::get_iot,
        telemetry::get_environment,
        telemetry::list_risk,
        telemetry::get_worker_risk,
        telemetry::list_alerts,
        telemetry::list_rest_requests,
        telemetry::list_notifications,
        operations::approve_rest_request,
        operations::deny_rest_request,
        operations::dispatch_command,
        operations::dispatch_alert,
        operations::publish_notification
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::ReadyChecks,
            telemetry::IotResponse,
            telemetry::StreamAvailability,
            telemetry::AlertsResponse,
            telemetry::PendingRestRequest,
            telemetry::RestRequestsResponse,
            operations::CommandDispatched,
            operations::NotifyRequest,
            VitalsSnapshot,
            EdgeIntelligenceSnapshot,
            DeviceStatus,
            SecurityStatus,
            EnvironmentReadings,
            WorkerRisk,
            CompositeRiskResult,
            RiskLevel,
            Recommendation,
            RestRequest,
            RestRequestStatus,
            RestResolution,
            CommandRequest,
            CommandId,
            Notification,
            Severity,
            TargetType
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Telemetry", description = "Live device streams and site conditions"),
        (name = "Risk", description = "Composite worker/machine risk"),
        (name = "Alerts", description = "Backend recommendations"),
        (name = "Rest Requests", description = "Worker rest request decisions"),
        (name = "Commands", description = "Operator command dispatch"),
        (name = "Notifications", description = "Site notification feed")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::watch;

    use crate::dispatch::{CommandDispatcher, DEFAULT_COMMAND_SOURCE};
    use crate::paths::SitePaths;
    use crate::state::AppState;
    use crate::store::InMemoryStore;
    use crate::telemetry::SiteSnapshot;

    /// State serving a fixed snapshot, backed by an empty memory store.
    pub fn state_with(snapshot: SiteSnapshot) -> AppState {
        state_with_store(snapshot, Arc::new(InMemoryStore::new()))
    }

    pub fn state_with_store(snapshot: SiteSnapshot, store: Arc<InMemoryStore>) -> AppState {
        let (_tx, rx) = watch::channel(Arc::new(snapshot));
        let dispatcher = CommandDispatcher::new(store, SitePaths::default(), DEFAULT_COMMAND_SOURCE);
        AppState::new(rx, Arc::new(dispatcher))
    }

    pub fn stored_commands(store: &InMemoryStore) -> Vec<Value> {
        match store.read("site/commands").ok().flatten() {
            Some(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{state_with, state_with_store, stored_commands};
    use super::*;
    use crate::store::InMemoryStore;
    use crate::telemetry::SiteSnapshot;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_and_readiness_routes() {
        let app = router(state_with(SiteSnapshot::default()));
        let (status, body) = call(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(app, get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["telemetry"], "loading");
    }

    #[tokio::test]
    async fn iot_route_serializes_the_snapshot() {
        let snapshot = SiteSnapshot {
            loading: false,
            ..SiteSnapshot::default()
        };
        let (status, body) = call(router(state_with(snapshot)), get("/v1/iot")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loading"], false);
        assert_eq!(body["vitals"], Value::Null);
        assert_eq!(body["online"]["vitals"], false);
        assert_eq!(body["security"]["tamper_detected"], false);
    }

    #[tokio::test]
    async fn unknown_worker_risk_is_404() {
        let (status, body) = call(
            router(state_with(SiteSnapshot::default())),
            get("/v1/workers/W1/risk"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("W1"));
    }

    #[tokio::test]
    async fn command_route_writes_and_debounces() {
        let store = Arc::new(InMemoryStore::new());
        let app = router(state_with_store(SiteSnapshot::default(), store.clone()));
        let command = json!({
            "action": "STOP MACHINE",
            "target_type": "machine",
            "target_id": "M1",
            "severity": "CRITICAL",
            "duration_s": 60
        });

        let (status, body) = call(app.clone(), post_json("/v1/commands", command.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["command_id"].as_str().is_some());

        let (status, _) = call(app, post_json("/v1/commands", command)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let written = stored_commands(&store);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["source"], "web_dashboard");
        assert_eq!(written[0]["status"], "PENDING");
    }

    #[tokio::test]
    async fn malformed_command_body_is_rejected() {
        let app = router(state_with(SiteSnapshot::default()));
        let (status, _) = call(
            app,
            post_json("/v1/commands", json!({ "action": "STOP", "target_type": "planet" })),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn approve_route_writes_break_command() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("site/rest_requests/r1", json!({ "worker_id": "W5", "status": "PENDING" }))
            .unwrap();
        let app = router(state_with_store(SiteSnapshot::default(), store.clone()));

        let (status, body) = call(app, post_json("/v1/rest-requests/r1/approve", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "APPROVED");

        let written = stored_commands(&store);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["duration_s"], 900);
        assert_eq!(written[0]["target_id"], "W5");
    }

    #[tokio::test]
    async fn encoded_slash_in_request_id_is_a_bad_request() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("site/rest_requests/a/b", json!({ "worker_id": "W5", "status": "PENDING" }))
            .unwrap();
        let app = router(state_with_store(SiteSnapshot::default(), store.clone()));

        let (status, _) = call(app, post_json("/v1/rest-requests/a%2Fb/deny", Value::Null)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.read("site/rest_requests/a/b/status").unwrap(), Some(json!("PENDING")));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (status, body) = call(
            router(state_with(SiteSnapshot::default())),
            get("/api-doc/openapi.json"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/v1/rest-requests/{request_id}/approve"].is_object());
    }
}
