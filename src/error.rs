use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// What a not-found webhook failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    Recipient,
    Lead,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundReason::Recipient => "recipient",
            NotFoundReason::Lead => "lead",
        }
    }
}

/// Failures surfaced to API callers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("signature or token verification failed")]
    AuthFailure,

    #[error("webhook token has already been used")]
    Replayed,

    #[error("{} not found", .0.as_str())]
    NotFound(NotFoundReason),

    #[error("no route for {0}")]
    NoRoute(String),

    #[error("unknown webhook event: {0}")]
    UnknownEvent(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn storage(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }

    pub fn missing_fields(fields: &[&str]) -> Self {
        ApiError::Validation(format!("missing required fields: {}", fields.join(", ")))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthFailure | ApiError::Replayed => StatusCode::CONFLICT,
            ApiError::NotFound(_) | ApiError::NoRoute(_) | ApiError::UnknownEvent(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn reason(&self) -> Option<&'static str> {
        match self {
            ApiError::NotFound(reason) => Some(reason.as_str()),
            ApiError::Replayed => Some("replay"),
            _ => None,
        }
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            reason: self.reason(),
        };
        (status, Json(body)).into_response()
    }
}
