//! `/api/health`: liveness plus the schema version of the open store.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;
use crate::error::AppError;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub schema_version: u32,
}

pub async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let schema_version = state.store.schema_version().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        schema_version,
    }))
}
