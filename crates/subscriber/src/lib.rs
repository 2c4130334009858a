//! Relay subscriber — client side of the per-user event relay.

pub mod cli;
pub mod config;
pub mod error;
pub mod relay_client;

pub use config::ClientConfig;
pub use error::ClientError;
pub use relay_client::{subscribe, ConnectionStatus, Publisher, Subscription};
