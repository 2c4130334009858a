//! Event records and control messages exchanged over the relay WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// WebSocket message types.
pub mod ws_types {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const TRANSACTION: &str = "transaction";
    pub const CUSTOMER: &str = "customer";
    pub const INVOICE: &str = "invoice";
    pub const PAY_LINK: &str = "payLink";
    pub const PLAN: &str = "plan";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const INTEGRATION: &str = "integration";
    pub const WITHDRAWAL: &str = "withdrawal";
    pub const SUPPORT_TICKET: &str = "supportTicket";
    pub const TEAM_MEMBER: &str = "teamMember";
}

/// Errors raised while decoding or validating relay messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message has no \"type\" field")]
    MissingType,
    #[error("userId must not be empty")]
    EmptyUserId,
}

/// Lifecycle action attached to some `plan` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Created,
    Updated,
    Deleted,
}

/// Type-specific part of an event. The record itself is opaque to the relay
/// and carried as JSON under a field named after the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventBody {
    Transaction {
        transaction: Value,
    },
    Customer {
        customer: Value,
    },
    Invoice {
        invoice: Value,
    },
    PayLink {
        #[serde(rename = "payLink")]
        pay_link: Value,
    },
    Plan {
        plan: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<PlanAction>,
    },
    Subscription {
        subscription: Value,
    },
    Integration {
        integration: Value,
    },
    Withdrawal {
        withdrawal: Value,
    },
    SupportTicket {
        ticket: Value,
    },
    TeamMember {
        member: Value,
    },
}

impl EventBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transaction { .. } => ws_types::TRANSACTION,
            Self::Customer { .. } => ws_types::CUSTOMER,
            Self::Invoice { .. } => ws_types::INVOICE,
            Self::PayLink { .. } => ws_types::PAY_LINK,
            Self::Plan { .. } => ws_types::PLAN,
            Self::Subscription { .. } => ws_types::SUBSCRIPTION,
            Self::Integration { .. } => ws_types::INTEGRATION,
            Self::Withdrawal { .. } => ws_types::WITHDRAWAL,
            Self::SupportTicket { .. } => ws_types::SUPPORT_TICKET,
            Self::TeamMember { .. } => ws_types::TEAM_MEMBER,
        }
    }
}

/// Event addressed to one user, e.g.
/// `{"type":"transaction","userId":"abc123","transaction":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    pub fn new(user_id: impl Into<String>, body: EventBody) -> Self {
        Self {
            user_id: user_id.into(),
            body,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Decode an inbound event. Unknown types and missing record fields are
    /// rejected.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let event: Self = serde_json::from_str(raw)?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.user_id.trim().is_empty() {
            return Err(ProtocolError::EmptyUserId);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Control message sent by a subscriber to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl ClientMessage {
    pub fn subscribe(user_id: impl Into<String>) -> Self {
        Self::Subscribe {
            user_id: user_id.into(),
        }
    }

    /// Parse a raw inbound frame.
    ///
    /// Returns `Ok(None)` for well-formed messages of a type the relay does not
    /// act on (clients may send application messages on the same socket).
    pub fn parse(raw: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if kind != ws_types::SUBSCRIBE {
            return Ok(None);
        }
        let msg: Self = serde_json::from_value(value)?;
        let Self::Subscribe { user_id } = &msg;
        if user_id.trim().is_empty() {
            return Err(ProtocolError::EmptyUserId);
        }
        Ok(Some(msg))
    }
}
