//! Data shapes shared by the channel, its transports and callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tagged payload: the shape tag (`mark`) and the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cage {
    pub mark: String,
    pub data: Value,
}

impl Cage {
    pub fn new(mark: impl Into<String>, data: Value) -> Self {
        Self {
            mark: mark.into(),
            data,
        }
    }

    /// Shorthand for the common `json` mark.
    pub fn json(data: Value) -> Self {
        Self::new("json", data)
    }
}

/// Connection descriptor produced by the login step.
///
/// The channel treats it as an opaque capability: `url` and `port` address
/// the server, `ship` names the remote identity commands are sent to and
/// `cookie` is attached verbatim as the `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub ship: String,
    pub url: String,
    pub port: u16,
    pub cookie: String,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            ship: String::new(),
            url: "http://localhost".to_string(),
            port: 8080,
            cookie: String::new(),
        }
    }
}

impl Connection {
    pub fn new(
        ship: impl Into<String>,
        url: impl Into<String>,
        port: u16,
        cookie: impl Into<String>,
    ) -> Self {
        Self {
            ship: ship.into(),
            url: url.into(),
            port,
            cookie: cookie.into(),
        }
    }

    /// Base address of the server, `<url>:<port>`.
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }
}

/// Everything a subscription can be told, in delivery order: any number of
/// `Event`s followed by at most one `Error` or `Quit`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// A diff delivered for the subscription, tagged with its expected mark.
    Event(Cage),
    /// The server refused the subscription.
    Error(Value),
    /// The server ended the subscription. Carries the full quit message.
    Quit(Value),
}

impl SubscriptionEvent {
    /// Whether this event ends the subscription.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriptionEvent::Event(_))
    }
}
