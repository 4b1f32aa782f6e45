//! Client for the channel protocol of an agent-hosting HTTP server.
//!
//! A channel multiplexes many concurrent operations over two asymmetric
//! transports:
//!
//! ```text
//!            PUT <url>:<port>/~/channel/<uid>   [ack?, command]
//! Channel ───────────────────────────────────────────────────────▶ Server
//!    ▲                                                               │
//!    │       GET <url>:<port>/~/channel/<uid>   (text/event-stream)  │
//!    └───────────────────────────────────────────────────────────────┘
//!                    id: <seq>  data: {"id":..,"response":..}
//! ```
//!
//! Outbound commands are pokes (one-shot request/response) and subscriptions
//! (a feed of diffs that ends with a quit). Every command carries a request id
//! from a single per-channel sequence; inbound events are routed back to the
//! waiting caller by that id.

pub mod channel;
pub mod config;
pub mod error;
pub mod transport;
pub mod types;

pub use channel::{Channel, PendingPoke, Subscription, SubscriptionHandler};
pub use crate::config::{AirlockConfig, ClientConfig};
pub use error::{ChannelError, ChannelResult};
pub use transport::{EventStream, HttpTransport, StreamEvent, Transport};
pub use types::{Cage, Connection, SubscriptionEvent};
