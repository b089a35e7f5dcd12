use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Typed failures from a payment gateway adapter
///
/// Business rejections are kept separate from transport problems so callers
/// can preserve the provider's own code/message for diagnostics.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Non-2xx HTTP response or timeout from the provider
    #[error("gateway transport failure: {0}")]
    Transport(String),

    /// Provider accepted the request but returned a non-zero result code
    #[error("gateway rejected request (code {code}): {message}")]
    Rejected { code: String, message: String },

    /// 2xx response missing an expected field (e.g. no payment URL)
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payment gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors (fatal at startup, never per-request)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "message": error_message,
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_preserves_provider_code() {
        let err = GatewayError::Rejected {
            code: "1006".to_string(),
            message: "Transaction denied by user".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1006"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_gateway_error_maps_to_bad_gateway() {
        let err: AppError = GatewayError::Transport("connect timeout".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_configuration_error_is_internal() {
        let err = AppError::configuration("MOMO_SECRET_KEY not set");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
