//! Configuration for the relayer.

use std::str::FromStr;

/// How subscribes from the same user share the registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every live session of a user receives each event.
    All,
    /// Only the most recently subscribed session receives events.
    Latest,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Latest => "latest",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "latest" => Ok(Self::Latest),
            other => Err(ConfigError::InvalidDeliveryMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DELIVERY_MODE must be \"all\" or \"latest\", got {0:?}")]
    InvalidDeliveryMode(String),
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Relayer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Bearer key required on `POST /api/events`. Publishing is open when unset.
    pub publish_api_key: Option<String>,
    pub delivery_mode: DeliveryMode,
    /// Per-connection outbound queue; events beyond it are dropped for that connection.
    pub outbound_queue_size: usize,
    pub ping_interval_secs: u64,
    /// Per-IP burst of WebSocket upgrades before rate limiting kicks in.
    pub ws_connect_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .or_else(|_| std::env::var("WEBSOCKET_PORT"))
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);
        let publish_api_key = std::env::var("PUBLISH_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let delivery_mode = match std::env::var("DELIVERY_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => DeliveryMode::All,
        };
        let outbound_queue_size = std::env::var("OUTBOUND_QUEUE_SIZE")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .unwrap_or(64);
        let ping_interval_secs = std::env::var("PING_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);
        let ws_connect_burst = std::env::var("WS_CONNECT_BURST")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let config = Self {
            host,
            port,
            publish_api_key,
            delivery_mode,
            outbound_queue_size,
            ping_interval_secs,
            ws_connect_burst,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loopback config on an ephemeral port.
    pub fn for_test(delivery_mode: DeliveryMode, publish_api_key: Option<&str>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            publish_api_key: publish_api_key.map(String::from),
            delivery_mode,
            outbound_queue_size: 16,
            ping_interval_secs: 30,
            ws_connect_burst: 100,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_queue_size == 0 {
            return Err(ConfigError::Zero {
                name: "OUTBOUND_QUEUE_SIZE",
            });
        }
        if self.ping_interval_secs == 0 {
            return Err(ConfigError::Zero {
                name: "PING_INTERVAL_SECS",
            });
        }
        if self.ws_connect_burst == 0 {
            return Err(ConfigError::Zero {
                name: "WS_CONNECT_BURST",
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
