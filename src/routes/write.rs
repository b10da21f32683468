use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use crate::error::AppError;
use crate::pipeline::validate::{self, RawFix};
use crate::state::AppState;
use crate::types::fix::Fix;

/// `GET`/`HEAD /write`. Trackers upload with query parameters only;
/// unrecognised parameters such as an API key are left to outer layers.
pub fn router() -> Router<AppState> {
    Router::new().route("/write", get(write))
}

async fn write(
    State(state): State<AppState>,
    query: Result<Query<RawFix>, QueryRejection>,
) -> Result<Json<Fix>, AppError> {
    let Query(raw) = query?;
    let fix = validate::validate(&raw, Utc::now(), &state.config().validation_rules())?;

    let ingest = state.ingest().clone();
    let stored = tokio::task::spawn_blocking(move || ingest.ingest(fix))
        .await
        .map_err(|e| AppError::Internal(format!("Ingest task failed: {}", e)))??;

    Ok(Json(stored))
}
