use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracklog_rs::{config, routes, state};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracklog_rs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env();
    let port = config.port;
    if config.allow_stale_timestamps {
        tracing::warn!("Client timestamp freshness check disabled");
    }

    let state = state::AppState::new(config).map_err(std::io::Error::other)?;

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::write::router())
        .merge(routes::read::router())
        .merge(routes::stats::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Tracklog listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("Write: GET http://{}/write", addr);
    tracing::info!("Read: GET http://{}/read?index=0", addr);

    axum::serve(listener, app).await
}
