//! Client configuration.

use std::time::Duration;

use crate::relay_client::BackoffConfig;

const DEFAULT_SEND_QUEUE_SIZE: usize = 256;

/// Where the relayer lives and how to reconnect to it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    /// Base URL for HTTP calls (publish). Derived from `ws_url` when unset.
    pub http_url: String,
    pub publish_api_key: Option<String>,
    pub backoff: BackoffConfig,
    /// Messages `Subscription::send` may hold while disconnected.
    pub send_queue_size: usize,
}

impl ClientConfig {
    /// Optional env: RELAYER_WS_URL, RELAYER_URL, PUBLISH_API_KEY,
    /// BACKOFF_INITIAL_MS, BACKOFF_MAX_MS, SEND_QUEUE_SIZE
    pub fn from_env() -> Self {
        let ws_url =
            std::env::var("RELAYER_WS_URL").unwrap_or_else(|_| "ws://localhost:8080/ws".to_string());
        let http_url =
            std::env::var("RELAYER_URL").unwrap_or_else(|_| http_base_from_ws(&ws_url));
        let publish_api_key = std::env::var("PUBLISH_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let defaults = BackoffConfig::default();
        let initial_ms = std::env::var("BACKOFF_INITIAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.initial.as_millis() as u64);
        let max_ms = std::env::var("BACKOFF_MAX_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max.as_millis() as u64);
        let send_queue_size = std::env::var("SEND_QUEUE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SEND_QUEUE_SIZE);

        Self {
            ws_url,
            http_url,
            publish_api_key,
            backoff: BackoffConfig {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
                ..defaults
            },
            send_queue_size,
        }
    }

    /// Config for a relayer at `addr` (host:port), e.g. one started in a test.
    pub fn for_addr(addr: impl std::fmt::Display) -> Self {
        let ws_url = format!("ws://{}/ws", addr);
        Self {
            http_url: http_base_from_ws(&ws_url),
            ws_url,
            publish_api_key: None,
            backoff: BackoffConfig::default(),
            send_queue_size: DEFAULT_SEND_QUEUE_SIZE,
        }
    }
}

/// `ws://host/ws` -> `http://host`, `wss://` -> `https://`.
pub fn http_base_from_ws(ws_url: &str) -> String {
    let http_url = ws_url
        .replace("wss://", "https://")
        .replace("ws://", "http://");
    http_url.trim_end_matches('/').trim_end_matches("/ws").to_string()
}
