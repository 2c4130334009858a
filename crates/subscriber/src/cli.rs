//! CLI argument parsing.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use shared::Event;

#[derive(Parser)]
#[command(name = "subscriber")]
#[command(about = "Relay subscriber — watch or publish per-user payment events")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe as a user and print every event as a JSON line
    Listen {
        #[arg(long, value_name = "USER_ID")]
        user_id: String,
    },

    /// Publish one event through the relayer's HTTP endpoint
    Publish {
        #[arg(long, value_name = "USER_ID")]
        user_id: String,

        /// Event type, e.g. transaction, payLink, plan
        #[arg(long = "type", value_name = "TYPE")]
        kind: String,

        /// JSON object with the type's fields, e.g. '{"transaction":{"amount":5}}'
        #[arg(long, value_name = "JSON")]
        payload: String,
    },
}

/// Merge `type` and `userId` into `payload` and validate the result.
pub fn build_event(user_id: &str, kind: &str, payload: &str) -> anyhow::Result<Event> {
    let mut value: Value = serde_json::from_str(payload).context("payload is not JSON")?;
    let object = value
        .as_object_mut()
        .context("payload must be a JSON object")?;
    object.insert("type".to_string(), Value::String(kind.to_string()));
    object.insert("userId".to_string(), Value::String(user_id.to_string()));
    let event: Event = serde_json::from_value(value)
        .with_context(|| format!("payload does not match event type {:?}", kind))?;
    event.validate()?;
    Ok(event)
}
