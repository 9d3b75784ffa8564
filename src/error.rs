use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure taxonomy surfaced to callers. Every command maps its error onto
/// one of these kinds; the boolean gates (mqtt auth) never produce one.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::InvalidInput(_) => "invalid_input",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Unauthorized(_) => "unauthorized",
            RegistryError::Conflict(_) => "conflict",
            RegistryError::Upstream(_) => "upstream_failure",
            RegistryError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
