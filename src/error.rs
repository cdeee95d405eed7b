use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

/// Request-scoped failures. Startup and configuration failures use
/// `anyhow` in the binary shell instead and never reach a response.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("{0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0}")]
    Upstream(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidJson | RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Auth(_) | RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the JSON error body. `details` is only populated for server
    /// errors when debug diagnostics are enabled.
    pub fn to_body(&self, debug_errors: bool) -> serde_json::Value {
        let status = self.status_code();
        if debug_errors && status == StatusCode::INTERNAL_SERVER_ERROR {
            json!({ "error": self.to_string(), "details": format!("{:?}", self) })
        } else {
            json!({ "error": self.to_string() })
        }
    }
}

// Default rendering never leaks diagnostics; the handler re-renders with
// the debug flag when it is set.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_body(false))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let err = RelayError::Validation("Field 'ask' is required".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_body(false)["error"], "Field 'ask' is required");
    }

    #[test]
    fn test_invalid_json_message_is_exact() {
        let err = RelayError::InvalidJson;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_body(true)["error"], "Invalid JSON");
        // 400s never carry details, debug flag or not
        assert!(err.to_body(true).get("details").is_none());
    }

    #[test]
    fn test_upstream_maps_to_500_verbatim() {
        let err = RelayError::Upstream("quota exceeded".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.to_body(false);
        assert_eq!(body["error"], "quota exceeded");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_debug_errors_adds_details_on_500() {
        let err = RelayError::Upstream("connection refused".to_string());
        let body = err.to_body(true);
        assert_eq!(body["error"], "connection refused");
        assert!(body["details"].as_str().unwrap().contains("Upstream"));
    }
}
