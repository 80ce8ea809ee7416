//! Request bodies and the error envelope for the sandbox HTTP surface.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use dcx_core::current_rfc3339_timestamp;

use crate::SandboxError;

#[derive(Debug)]
pub(super) struct SandboxApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl SandboxApiError {
    pub(super) fn malformed_body(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
        }
    }

    pub(super) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl From<SandboxError> for SandboxApiError {
    fn from(error: SandboxError) -> Self {
        Self {
            status: StatusCode::from_u16(error.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for SandboxApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "status": "error",
                "code": self.code,
                "message": self.message,
                "timestamp": current_rfc3339_timestamp(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WriteRequest {
    pub(super) file: String,
    #[serde(default)]
    pub(super) content: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListRequest {
    #[serde(default = "default_list_path")]
    pub(super) path: String,
}

fn default_list_path() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteRequest {
    pub(super) path: String,
    #[serde(default)]
    pub(super) recursive: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct MoveRequest {
    pub(super) source: String,
    pub(super) destination: String,
    #[serde(default)]
    pub(super) overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct MkdirRequest {
    pub(super) path: String,
    #[serde(default)]
    pub(super) parents: bool,
    #[serde(default)]
    pub(super) exist_ok: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct StatRequest {
    pub(super) path: String,
}
