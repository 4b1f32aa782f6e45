//! Channel error types.

use serde_json::Value;
use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while driving a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request could not be sent.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered a command batch with a non-success status.
    #[error("channel request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The inbound event stream could not be opened or failed.
    #[error("event stream error: {0}")]
    Stream(String),

    /// A command batch could not be encoded.
    #[error("failed to encode command batch: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The server reported a poke failure. Carries the `err` payload verbatim.
    #[error("poke rejected: {0}")]
    PokeRejected(Value),

    /// The channel went away before the operation settled.
    #[error("channel closed before the operation settled")]
    Closed,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
