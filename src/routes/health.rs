use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Reports unavailable when the data directory has gone away.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let data_dir = &state.config().data_dir;
    let (status, label) = if data_dir.is_dir() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
    };

    (
        status,
        Json(json!({
            "status": label,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
