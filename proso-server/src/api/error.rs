//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Error types for HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// Endpoint needs a signed-in user
    Unauthorized,
    /// Malformed request outside of the domain layer (headers, bodies)
    BadRequest(String),
    Common(proso_common::Error),
}

impl From<proso_common::Error> for ApiError {
    fn from(err: proso_common::Error) -> Self {
        ApiError::Common(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use proso_common::Error;

        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "The user has to be logged in".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Common(err) => match err {
                Error::Parse(_) | Error::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                Error::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                other => {
                    error!("Request failed: {}", other);
                    (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
                }
            },
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (proso_common::Error::Parse("x".into()).into(), StatusCode::BAD_REQUEST),
            (proso_common::Error::InvalidInput("x".into()).into(), StatusCode::BAD_REQUEST),
            (proso_common::Error::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (
                proso_common::Error::Internal("x".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
