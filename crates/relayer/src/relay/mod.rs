//! WebSocket relay state and per-user broadcast.

pub mod connection;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use shared::Event;

use crate::config::DeliveryMode;

pub type ConnectionId = Uuid;

/// Sender half of a connection's outbound queue (serialized events).
pub type OutboundSender = mpsc::Sender<String>;

#[derive(Debug, Clone)]
struct Session {
    id: ConnectionId,
    tx: OutboundSender,
}

/// Relay state: user id -> live sessions, plus the shutdown signal every
/// connection task listens on.
pub struct RelayState {
    sessions: DashMap<String, Vec<Session>>,
    mode: DeliveryMode,
    shutdown: watch::Sender<bool>,
}

impl RelayState {
    pub fn new(mode: DeliveryMode) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            sessions: DashMap::new(),
            mode,
            shutdown,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Map `user_id` to the connection `id`. In `Latest` mode this replaces any
    /// previous session of the user.
    pub fn register(&self, user_id: &str, id: ConnectionId, tx: OutboundSender) {
        let session = Session { id, tx };
        match self.mode {
            DeliveryMode::Latest => {
                let replaced = self.sessions.insert(user_id.to_string(), vec![session]);
                if let Some(old) = replaced.and_then(|v| v.into_iter().next()) {
                    tracing::debug!(user_id, conn_id = %old.id, "session replaced");
                }
            }
            DeliveryMode::All => {
                let mut entry = self.sessions.entry(user_id.to_string()).or_default();
                entry.retain(|s| !s.tx.is_closed());
                entry.push(session);
            }
        }
        tracing::info!(user_id, conn_id = %id, "subscribed");
    }

    /// Remove connection `id` from `user_id`'s entry. Returns false if the
    /// connection was no longer mapped (closed already, or replaced).
    pub fn unregister(&self, user_id: &str, id: ConnectionId) -> bool {
        let removed = match self.sessions.get_mut(user_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|s| s.id != id);
                entry.len() != before
            }
            None => false,
        };
        self.sessions.remove_if(user_id, |_, v| v.is_empty());
        if removed {
            tracing::info!(user_id, conn_id = %id, "unsubscribed");
        }
        removed
    }

    /// Queue `event` on every live session of its user. Fire-and-forget:
    /// returns how many sessions accepted it, which callers may ignore.
    pub fn broadcast(&self, event: &Event) -> usize {
        let Some(entry) = self.sessions.get(&event.user_id) else {
            tracing::debug!(user_id = %event.user_id, kind = event.kind(), "no live session");
            return 0;
        };
        let json = match event.to_json() {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event");
                return 0;
            }
        };
        let mut delivered = 0;
        for session in entry.iter() {
            match session.tx.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        user_id = %event.user_id,
                        conn_id = %session.id,
                        kind = event.kind(),
                        "outbound queue full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(conn_id = %session.id, "session already closed");
                }
            }
        }
        delivered
    }

    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|e| e.value().len()).sum()
    }

    pub fn sessions_for(&self, user_id: &str) -> usize {
        self.sessions.get(user_id).map(|e| e.len()).unwrap_or(0)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Tell every connection task to close its socket and drop all entries.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.sessions.clear();
    }
}
