//! Relayer client: live subscription over WebSocket, event publishing over HTTP.

mod backoff;
mod publish;
mod ws;

pub use backoff::{Backoff, BackoffConfig};
pub use publish::Publisher;
pub use ws::{subscribe, ConnectionStatus, Subscription};
