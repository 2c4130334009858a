//! API route handlers.

use std::time::Duration;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use shared::Event;

use crate::api::AppState;
use crate::relay::connection;

/// Per-IP limit on WebSocket upgrades: `burst` connections, 1 replenished per second.
pub(crate) fn ws_rate_limit_layer(
    burst: u32,
) -> anyhow::Result<
    GovernorLayer<
        tower_governor::key_extractor::PeerIpKeyExtractor,
        governor::middleware::NoOpMiddleware,
        axum::body::Body,
    >,
> {
    let config = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(burst)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid ws rate limit (burst {})", burst))?;
    Ok(GovernorLayer::new(config))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(events_publish))
        .route("/stats", get(stats))
}

/// Relay statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub users: usize,
    pub connections: usize,
    pub delivery_mode: String,
    pub started_at: String,
}

// --- Events ---

/// Publish an event to its user's live sessions. Always 202 once accepted:
/// whether anyone was connected is not reported.
async fn events_publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<Event>,
) -> Result<StatusCode, (StatusCode, String)> {
    if let Some(key) = state.config.publish_api_key.as_deref() {
        let token = extract_bearer_from_headers(&headers)?;
        if token != key {
            return Err((StatusCode::UNAUTHORIZED, "invalid publish key".to_string()));
        }
    }
    event
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let delivered = state.relay.broadcast(&event);
    tracing::debug!(
        user_id = %event.user_id,
        kind = event.kind(),
        delivered,
        "event published"
    );
    Ok(StatusCode::ACCEPTED)
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        users: state.relay.user_count(),
        connections: state.relay.connection_count(),
        delivery_mode: state.relay.mode().as_str().to_string(),
        started_at: state.started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    })
}

// --- WebSocket ---

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> axum::response::Response {
    let queue_size = state.config.outbound_queue_size;
    let ping_interval = Duration::from_secs(state.config.ping_interval_secs);
    ws.on_upgrade(move |socket| {
        connection::serve_socket(socket, state.relay, queue_size, ping_interval)
    })
}

// --- Auth ---

fn extract_bearer_from_headers(headers: &HeaderMap) -> Result<String, (StatusCode, String)> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").map(String::from))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "missing authorization".to_string(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{router, AppState};
    use crate::config::{Config, DeliveryMode};
    use crate::relay::RelayState;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn state(publish_key: Option<&str>) -> AppState {
        let config = Config::for_test(DeliveryMode::All, publish_key);
        AppState::new(
            Arc::new(RelayState::new(config.delivery_mode)),
            Arc::new(config),
        )
    }

    fn publish_request(body: serde_json::Value, bearer: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/events")
            .header("Content-Type", "application/json");
        if let Some(b) = bearer {
            req = req.header("Authorization", format!("Bearer {}", b));
        }
        req.body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let app = router(state(None)).unwrap();
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn publish_delivers_to_registered_session() {
        let state = state(None);
        let (tx, mut rx) = mpsc::channel(4);
        state.relay.register("abc123", Uuid::new_v4(), tx);
        let app = router(state).unwrap();

        let body = serde_json::json!({
            "type": "transaction",
            "userId": "abc123",
            "transaction": {"amount": 5}
        });
        let res = app.oneshot(publish_request(body.clone(), None)).await.unwrap();

        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let got: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(got, body);
    }

    #[tokio::test]
    async fn publish_to_unknown_user_is_still_accepted() {
        let app = router(state(None)).unwrap();
        let body = serde_json::json!({
            "type": "withdrawal",
            "userId": "nonexistent",
            "withdrawal": {}
        });
        let res = app.oneshot(publish_request(body, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn publish_requires_key_when_configured() {
        let body = serde_json::json!({"type": "customer", "userId": "u", "customer": {}});

        let app = router(state(Some("secret"))).unwrap();
        let res = app.oneshot(publish_request(body.clone(), None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let app = router(state(Some("secret"))).unwrap();
        let res = app
            .oneshot(publish_request(body.clone(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let app = router(state(Some("secret"))).unwrap();
        let res = app
            .oneshot(publish_request(body, Some("secret")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn publish_rejects_events_outside_the_union() {
        let app = router(state(None)).unwrap();
        let body = serde_json::json!({"type": "refund", "userId": "u", "refund": {}});
        let res = app.oneshot(publish_request(body, None)).await.unwrap();
        assert!(res.status().is_client_error());

        let app = router(state(None)).unwrap();
        let body = serde_json::json!({"type": "invoice", "userId": "", "invoice": {}});
        let res = app.oneshot(publish_request(body, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_reports_registry_size() {
        let state = state(None);
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        state.relay.register("a", Uuid::new_v4(), tx1);
        state.relay.register("a", Uuid::new_v4(), tx2);
        let app = router(state).unwrap();

        let res = app
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let stats: StatsResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.delivery_mode, "all");
    }
}
