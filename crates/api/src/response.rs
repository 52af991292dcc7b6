use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use taskbay_core::CoreError;

pub type AppSuccess = GenericResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericResponse {
    pub status: u16,
    pub message: String,
    pub data: serde_json::Value,
}

impl GenericResponse {
    pub fn new(status: StatusCode, message: &str, data: serde_json::Value) -> Self {
        Self {
            status: status.as_u16(),
            message: message.to_string(),
            data,
        }
    }
}

impl IntoResponse for GenericResponse {
    fn into_response(self) -> Response {
        Json::from(self).into_response()
    }
}

// Make our own error that wraps `anyhow::Error`.
#[derive(Debug)]
pub struct AppError(pub StatusCode, pub anyhow::Error);
impl AppError {
    pub fn new(status: StatusCode, err: anyhow::Error) -> Self {
        Self(status, err)
    }
}

// Tell axum how to convert `AppError` into a response. Balance-precondition
// failures carry the shortfall in `data` so the frontend can prompt a top-up.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("CODE: {}, MESSAGE: {}", self.0.as_u16(), self.1);
        let data = match self.1.downcast_ref::<CoreError>() {
            Some(CoreError::InsufficientCredits { required, available }) => {
                json!({ "required": required, "available": available })
            }
            Some(CoreError::InsufficientFunds { requested, available }) => {
                json!({ "requested": requested, "available": available })
            }
            _ => json!({}),
        };
        GenericResponse::new(self.0, &self.1.to_string(), data).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, CoreError>`,
// picking the status code from the failure class.
impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::InsufficientCredits { .. } => StatusCode::BAD_REQUEST,
            CoreError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            CoreError::InvalidState(_) => StatusCode::CONFLICT,
            CoreError::Gateway(_) => StatusCode::BAD_GATEWAY,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(StatusCode::BAD_REQUEST, err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Database(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_http_statuses() {
        let cases: Vec<(CoreError, StatusCode)> = vec![
            (CoreError::NotFound("booking"), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("payment"), StatusCode::FORBIDDEN),
            (
                CoreError::InsufficientCredits { required: 5, available: 4 },
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::InsufficientFunds { requested: 5000, available: 1200 },
                StatusCode::BAD_REQUEST,
            ),
            (CoreError::invalid_state("payment is pending"), StatusCode::CONFLICT),
            (CoreError::gateway("timeout"), StatusCode::BAD_GATEWAY),
            (CoreError::validation("bad input"), StatusCode::BAD_REQUEST),
            (
                CoreError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let app: AppError = err.into();
            assert_eq!(app.0, expected, "wrong status for {}", app.1);
        }
    }

    #[test]
    fn forbidden_message_never_leaks_existence() {
        let app: AppError = CoreError::Forbidden("payment").into();
        assert_eq!(app.1.to_string(), "not authorized to access this payment");
    }

    #[test]
    fn shortfall_is_still_downcastable_at_the_response_boundary() {
        let app: AppError = CoreError::InsufficientCredits { required: 5, available: 4 }.into();
        match app.1.downcast_ref::<CoreError>() {
            Some(CoreError::InsufficientCredits { required, available }) => {
                assert_eq!((*required, *available), (5, 4));
            }
            other => panic!("expected InsufficientCredits, got {:?}", other),
        }
    }
}
