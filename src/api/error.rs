//! REST error type mapping domain failures to status codes and a
//! `{"detail": ...}` body.

use crate::error::HabitError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Domain(HabitError),
    /// Missing or invalid bearer credentials
    Unauthorized,
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<HabitError> for ApiError {
    fn from(e: HabitError) -> Self {
        ApiError::Domain(e)
    }
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            ApiError::Domain(e @ HabitError::NotFound { .. }) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Domain(e @ HabitError::PermissionDenied) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Domain(HabitError::Validation(msg)) | ApiError::Domain(HabitError::Conflict(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Domain(e) => {
                error!("Request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Could not validate credentials".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => {
                error!("Request failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        let body = Json(json!({ "detail": detail }));

        if matches!(self, ApiError::Unauthorized) {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_status_mapping() {
        let cases = [
            (ApiError::from(HabitError::habit_not_found()), StatusCode::NOT_FOUND),
            (ApiError::from(HabitError::PermissionDenied), StatusCode::BAD_REQUEST),
            (ApiError::from(HabitError::Conflict("dup".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(HabitError::CorruptRow("bad".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_detail().0, status);
        }
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_permission_detail() {
        let (_, detail) = ApiError::from(HabitError::PermissionDenied).status_and_detail();
        assert_eq!(detail, "Not enough permissions");
    }
}
