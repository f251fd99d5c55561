use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,
}

impl HubError {
    /// Stable machine-readable code for response bodies and log fields
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Config(_) => "CONFIG_ERROR",
            HubError::Redis(_) => "BUS_UNAVAILABLE",
            HubError::Serialization(_) => "SERIALIZATION_ERROR",
            HubError::SendFailed(_) => "SEND_FAILED",
            HubError::SendTimeout(_) => "SEND_TIMEOUT",
            HubError::ConnectionClosed => "CONNECTION_CLOSED",
            HubError::Unauthorized => "UNAUTHORIZED",
            HubError::Forbidden => "FORBIDDEN",
        }
    }
}

impl ResponseError for HubError {
    fn status_code(&self) -> StatusCode {
        match self {
            HubError::Unauthorized => StatusCode::UNAUTHORIZED,
            HubError::Forbidden => StatusCode::FORBIDDEN,
            HubError::Serialization(_) => StatusCode::BAD_REQUEST,
            HubError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::SendFailed("socket reset".to_string());
        assert_eq!(err.to_string(), "send failed: socket reset");

        let err = HubError::SendTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "send timed out after 250ms");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json");
        let err: HubError = json_err.unwrap_err().into();
        assert!(matches!(err, HubError::Serialization(_)));
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HubError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(HubError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            HubError::Config("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
