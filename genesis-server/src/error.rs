//! API error types.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::http::header::CONTENT_RANGE;
use axum::response::{IntoResponse, Response};
use genesis_core::GenesisError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] GenesisError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Core(error) => match error {
                GenesisError::Unauthorized => "forbidden",
                GenesisError::SequenceGap { .. } => "sequence_gap",
                GenesisError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
                GenesisError::InvalidRequest(_) | GenesisError::Json(_) => "bad_request",
                error if error.is_not_found() => "not_found",
                _ => "internal_error",
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(error) => match error {
                GenesisError::Unauthorized => StatusCode::FORBIDDEN,
                GenesisError::SequenceGap { .. } => StatusCode::CONFLICT,
                GenesisError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                GenesisError::InvalidRequest(_) | GenesisError::Json(_) => StatusCode::BAD_REQUEST,
                error if error.is_not_found() => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    data: Option<()>,
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(ErrorBody {
            success: false,
            data: None,
            error: self.to_string(),
            code: self.code(),
        });

        match &self {
            Self::Core(GenesisError::RangeNotSatisfiable { total, .. }) => {
                let content_range = format!("bytes */{}", total);
                (status, [(CONTENT_RANGE, content_range)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
