//! Outbound wire commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single element of an outbound command batch, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    /// Acknowledge every pushed event up to and including `event_id`.
    Ack {
        #[serde(rename = "event-id")]
        event_id: u64,
    },

    /// One-shot request to an agent.
    Poke {
        id: u64,
        ship: String,
        app: String,
        mark: String,
        json: Value,
    },

    /// Open a feed of diffs from an agent at `path`.
    Subscribe {
        id: u64,
        ship: String,
        app: String,
        path: String,
    },

    /// Ask the server to end subscription `subscription`.
    Unsubscribe { id: u64, subscription: u64 },
}

impl Command {
    /// Request id of the command; acks are not tracked requests.
    pub fn id(&self) -> Option<u64> {
        match self {
            Command::Ack { .. } => None,
            Command::Poke { id, .. }
            | Command::Subscribe { id, .. }
            | Command::Unsubscribe { id, .. } => Some(*id),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::Ack { .. } => "ack",
            Command::Poke { .. } => "poke",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
        }
    }
}
