//! Ledger errors as HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Handler error carrying a `hwa_common::Error`
#[derive(Debug)]
pub struct ApiError(pub hwa_common::Error);

impl From<hwa_common::Error> for ApiError {
    fn from(err: hwa_common::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use hwa_common::Error;

        let status = match &self.0 {
            Error::InvalidInput(_) | Error::MalformedAddress { .. } => StatusCode::BAD_REQUEST,
            Error::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            err if err.is_rule_violation() => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
        }));

        (status, body).into_response()
    }
}
