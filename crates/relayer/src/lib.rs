//! Payment event relayer — per-user WebSocket delivery of dashboard events.

pub mod api;
pub mod config;
pub mod relay;
pub mod server;

pub use server::RelayServer;
