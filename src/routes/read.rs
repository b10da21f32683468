use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, StoreError};
use crate::state::AppState;
use crate::types::fix::Fix;

pub fn router() -> Router<AppState> {
    Router::new().route("/read", get(read))
}

/// Polling cursor: clients send the last received index + 1.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CursorQuery {
    #[serde(default)]
    pub index: u64,
}

#[derive(Serialize)]
struct ReadResponse {
    entries: Vec<Fix>,
}

async fn read(
    State(state): State<AppState>,
    query: Result<Query<CursorQuery>, QueryRejection>,
) -> Result<Json<ReadResponse>, AppError> {
    let Query(cursor) = query?;
    let ingest = state.ingest().clone();
    let entries = tokio::task::spawn_blocking(move || {
        ingest
            .read_from(cursor.index)?
            .collect::<Result<Vec<Fix>, StoreError>>()
    })
    .await
    .map_err(|e| AppError::Internal(format!("Read task failed: {}", e)))??;

    tracing::debug!("Served {} fixes from index {}", entries.len(), cursor.index);

    Ok(Json(ReadResponse { entries }))
}
