// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::dispatch::DispatchError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let message = err.to_string();
        match err {
            DispatchError::Debounced(_) | DispatchError::AlreadyResolved { .. } => {
                Self::conflict(message)
            }
            DispatchError::NotFound(_) => Self::not_found(message),
            DispatchError::Invalid(_) => Self::bad_request(message),
            DispatchError::Malformed { .. } => Self::unprocessable(message),
            DispatchError::Store(_) | DispatchError::CommandWriteFailed { .. } => {
                warn!(error = %message, "Store write failed");
                Self::bad_gateway(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RestRequestStatus;
    use crate::store::StoreError;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let conflict = ApiError::conflict("again");
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let gateway = ApiError::bad_gateway("store down");
        assert_eq!(gateway.status, StatusCode::BAD_GATEWAY);
        assert_eq!(gateway.message, "store down");
    }

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::Debounced("k".into()), StatusCode::CONFLICT),
            (
                DispatchError::AlreadyResolved {
                    request_id: "r1".into(),
                    status: RestRequestStatus::Approved,
                },
                StatusCode::CONFLICT,
            ),
            (DispatchError::NotFound("r1".into()), StatusCode::NOT_FOUND),
            (DispatchError::Invalid("empty".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::Store(StoreError::Connectivity("offline".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                DispatchError::CommandWriteFailed {
                    request_id: "r1".into(),
                    source: StoreError::Rejected {
                        status: 401,
                        body: "denied".into(),
                    },
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn already_resolved_message_names_the_status() {
        let err = ApiError::from(DispatchError::AlreadyResolved {
            request_id: "r9".into(),
            status: RestRequestStatus::Denied,
        });
        assert_eq!(err.message, "rest request `r9` is already DENIED");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
