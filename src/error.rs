// HTTP API error taxonomy. Every rejection leaving the pipeline is one of
// these; internal detail (traces, query text) never crosses this boundary.
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::api::ApiResponse;
use crate::contract::ValidationResult;
use crate::security::AuthError;

/// Uniform error response: `{message, error?, errors?}` with the status
/// codes defined by the admin API surface.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - request failed contract validation
    BadRequest { errors: Vec<String> },

    /// 401 - authentication or CSRF check failed on a mandatory-auth endpoint
    AccessDenied { reason: AuthError },

    /// 500 - handler produced a response that violates the contract
    InvalidResponse,

    /// 500 - persistent store schema is older than the endpoint requires
    SchemaTooOld { minimum: u32 },

    /// 500 - handler failed or panicked; detail stays server-side
    Internal,

    /// 503 - persistent store not configured or unreachable
    DatabaseUnavailable,

    /// 503 - database operation failed mid-handler (transient infra issue)
    DatabaseError,
}

impl ApiError {
    pub fn bad_request(result: &ValidationResult) -> Self {
        ApiError::BadRequest { errors: result.error_names() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::AccessDenied { .. } => StatusCode::UNAUTHORIZED,
            ApiError::InvalidResponse => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SchemaTooOld { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest { .. } => "Bad Request".to_string(),
            ApiError::AccessDenied { .. } => "Access denied".to_string(),
            ApiError::InvalidResponse => "The server generated an invalid response.".to_string(),
            ApiError::SchemaTooOld { minimum } => format!(
                "Database schema version too old. Please update to at least {}.",
                minimum
            ),
            ApiError::Internal => "The server encountered an unexpected error.".to_string(),
            ApiError::DatabaseUnavailable => "Database not available.".to_string(),
            ApiError::DatabaseError => "Database error".to_string(),
        }
    }

    /// Client-facing JSON body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::BadRequest { errors } => json!({
                "message": self.message(),
                "errors": errors,
            }),
            ApiError::AccessDenied { reason } => json!({
                "message": self.message(),
                "error": reason.code(),
            }),
            _ => json!({ "message": self.message() }),
        }
    }

    pub fn to_response(&self) -> ApiResponse {
        ApiResponse::with_status(self.status_code(), self.to_json())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
