use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::routes::read::CursorQuery;
use crate::state::AppState;
use crate::types::stats::{StatusSummary, TripStatistics};

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

#[derive(Serialize)]
struct StatsResponse {
    statistics: TripStatistics,
    summary: StatusSummary,
}

async fn stats(
    State(state): State<AppState>,
    query: Result<Query<CursorQuery>, QueryRejection>,
) -> Result<Json<StatsResponse>, AppError> {
    let Query(cursor) = query?;
    let ingest = state.ingest().clone();
    let policy = state.max_speed_policy();
    let statistics =
        tokio::task::spawn_blocking(move || ingest.statistics(cursor.index, policy.as_ref()))
            .await
            .map_err(|e| AppError::Internal(format!("Statistics task failed: {}", e)))??;

    Ok(Json(StatsResponse {
        summary: statistics.summary(),
        statistics,
    }))
}
