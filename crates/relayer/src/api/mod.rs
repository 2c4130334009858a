//! HTTP API routes.

mod routes;

pub use routes::StatsResponse;

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::relay::RelayState;

/// Shared app state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayState>,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(relay: Arc<RelayState>, config: Arc<Config>) -> Self {
        Self {
            relay,
            config,
            started_at: Utc::now(),
        }
    }
}

pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let ws_routes = Router::new()
        .route("/ws", get(routes::ws_handler))
        .layer(routes::ws_rate_limit_layer(state.config.ws_connect_burst)?);

    Ok(Router::new()
        .route("/health", get(health))
        .nest("/api", routes::api_routes())
        .merge(ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state))
}

async fn health() -> &'static str {
    "ok"
}
