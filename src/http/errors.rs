use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    core::{limits::AdmissionError, pipeline::PipelineError},
    http::{mappers::ConversionError, models::ErrorResponse},
};

/// Failures of the request itself or of the service. Anything wrong with the
/// submitted program is reported inside a successful run instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self {
            ApiError::Pipeline(err) => {
                tracing::error!("Run aborted by infrastructure failure: {}", err);
                "Internal error while running code".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error,
        };
        (self.status(), Json(body)).into_response()
    }
}
