//! Live push channels
//!
//! The backend exposes two WebSocket endpoints, each sending one JSON
//! document per message:
//!
//! - `/ws/notifications`: `{"event": "order_created", "order_id": 1, "arrival_id": 2}`
//!   and `{"event": "order_status_changed", "order_id": 1, "status": "listo"}`
//! - `/ws/tables`: `{"event": "update_tables", "tables": [...]}`
//!
//! Messages with any other `event` tag are ignored. Delivery is at most
//! once: whatever the server sends while disconnected is lost.

mod client;
mod dedup;
mod policy;
mod transport;

pub use client::{ChannelHandle, ConnectionState, ErrorHandler, EventHandler, NotificationChannel};
pub use dedup::DedupFilter;
pub use policy::{Backoff, ReconnectPolicy};
pub use transport::{Connector, Frame, Transport, WsConnector};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Push endpoints offered by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tables,
    Notifications,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Tables => "/ws/tables",
            Endpoint::Notifications => "/ws/notifications",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Events pushed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderCreated { order_id: i64, arrival_id: i64 },
    OrderStatusChanged { order_id: i64, status: String },
    /// Full table layout snapshot
    UpdateTables { tables: Vec<serde_json::Value> },
}

impl NotificationEvent {
    const TAGS: [&'static str; 3] = ["order_created", "order_status_changed", "update_tables"];

    pub fn tag(&self) -> &'static str {
        match self {
            NotificationEvent::OrderCreated { .. } => "order_created",
            NotificationEvent::OrderStatusChanged { .. } => "order_status_changed",
            NotificationEvent::UpdateTables { .. } => "update_tables",
        }
    }

    /// Key used to suppress repeats; snapshots are never suppressed
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            NotificationEvent::OrderCreated {
                order_id,
                arrival_id,
            } => Some(format!("{}-{}-{}", self.tag(), order_id, arrival_id)),
            NotificationEvent::OrderStatusChanged { order_id, .. } => {
                Some(format!("{}-{}-", self.tag(), order_id))
            }
            NotificationEvent::UpdateTables { .. } => None,
        }
    }
}

/// Decode one message.
///
/// Returns `Ok(None)` for well-formed JSON whose tag is missing or unknown,
/// and an error for anything that is not JSON or has a known tag with a
/// malformed payload.
pub fn parse_message(text: &str) -> Result<Option<NotificationEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    match value.get("event").and_then(|e| e.as_str()) {
        Some(tag) if NotificationEvent::TAGS.contains(&tag) => serde_json::from_value(value).map(Some),
        _ => Ok(None),
    }
}
