//! Publish events through the relayer's HTTP endpoint.

use shared::Event;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// HTTP publisher for processes that do not hold the relay in memory.
#[derive(Debug, Clone)]
pub struct Publisher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl Publisher {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/events", config.http_url.trim_end_matches('/')),
            api_key: config.publish_api_key.clone(),
        }
    }

    /// POST `event`. Success only means the relayer accepted it, not that any
    /// session was connected.
    pub async fn publish(&self, event: &Event) -> Result<(), ClientError> {
        event.validate()?;
        let mut req = self.client.post(&self.endpoint).json(event);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if res.status().is_success() {
            tracing::debug!(user_id = %event.user_id, kind = event.kind(), "event published");
            Ok(())
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            Err(ClientError::Rejected { status, body })
        }
    }
}
