use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    constants::SERVICE_NAME,
    core::{domain::TestSpec, pipeline::run_submission},
    http::{
        AppState,
        errors::ApiError,
        models::{HealthResponse, RunRequest, RunResponse},
    },
};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tracing::instrument(skip_all)]
pub async fn run(
    State(state): State<AppState>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection);
        ApiError::InvalidJson
    })?;

    let program = state.limits.admit(request.code.unwrap_or_default())?;
    let tests = request
        .tests
        .unwrap_or_default()
        .into_iter()
        .map(TestSpec::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let result = run_submission(state.executor.clone(), program, tests).await?;
    Ok(Json(result.into()))
}
