use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use gsm_core::http::HttpError;
use security::{SlackSignatureError, TeamsJwtError};

/// One variant per §7 error kind. Handlers convert any lower-level error into
/// one of these before responding; nothing downstream matches on error text.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upstream call failed: {0}")]
    UpstreamFailure(String),
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
}

impl BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            BridgeError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
            BridgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            BridgeError::ConfigurationMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            BridgeError::AuthFailure(_) => "auth_failure",
            BridgeError::BadRequest(_) => "bad_request",
            BridgeError::UpstreamFailure(_) => "upstream_failure",
            BridgeError::ConfigurationMissing(_) => "configuration_missing",
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(kind = self.kind(), error = %self, "request failed");
        (
            status,
            Json(json!({"ok": false, "error": self.kind(), "message": self.to_string()})),
        )
            .into_response()
    }
}

impl From<SlackSignatureError> for BridgeError {
    fn from(err: SlackSignatureError) -> Self {
        BridgeError::AuthFailure(err.to_string())
    }
}

impl From<TeamsJwtError> for BridgeError {
    fn from(err: TeamsJwtError) -> Self {
        BridgeError::AuthFailure(err.to_string())
    }
}

impl From<HttpError> for BridgeError {
    fn from(err: HttpError) -> Self {
        BridgeError::UpstreamFailure(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::BadRequest(format!("invalid JSON: {err}"))
    }
}

/// Response body for the not-an-error duplicate case (§7 DuplicateEvent).
pub fn duplicate_event_response() -> Response {
    (StatusCode::OK, Json(json!({"ok": true, "deduped": true}))).into_response()
}

pub fn ok_response() -> Response {
    (StatusCode::OK, Json(json!({"ok": true}))).into_response()
}
