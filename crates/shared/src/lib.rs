//! Wire types shared by the relayer and subscriber crates.

mod models;

// Explicit re-exports (avoids rust-analyzer issues with `pub use models::*`)
pub use models::ws_types;
pub use models::{ClientMessage, Event, EventBody, PlanAction, ProtocolError};
