//! Client error type.

use shared::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("subscription closed")]
    Closed,
    #[error("send queue is full")]
    QueueFull,
    #[error("relayer returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
