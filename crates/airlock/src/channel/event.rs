//! Inbound message parsing.

use serde_json::Value;
use thiserror::Error;

/// Why an inbound event body could not be routed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("event body is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event body has no numeric request id")]
    MissingId,

    #[error("event body has no response kind")]
    MissingResponse,
}

/// Outcome of a poke, or of the acknowledgment of a subscribe.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ok,
    Err(Value),
}

impl Outcome {
    // An `err` field is the only failure marker; anything else counts as ok.
    fn from_body(body: &Value) -> Self {
        match body.get("err") {
            Some(err) => Outcome::Err(err.clone()),
            None => Outcome::Ok,
        }
    }
}

/// What the server is telling us about a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Poke(Outcome),
    Subscribe(Outcome),
    /// Payload (`json`) of a diff for an open subscription.
    Diff(Value),
    /// The whole quit message.
    Quit(Value),
    /// A response kind this client does not know.
    Other(String),
}

/// A parsed inbound event body: `{"id": <int>, "response": <kind>, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: u64,
    pub response: Response,
}

impl InboundMessage {
    pub fn parse(data: &str) -> Result<Self, ParseError> {
        let body: Value = serde_json::from_str(data)?;
        let id = body
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or(ParseError::MissingId)?;
        let kind = body
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or(ParseError::MissingResponse)?;

        let response = match kind {
            "poke" => Response::Poke(Outcome::from_body(&body)),
            "subscribe" => Response::Subscribe(Outcome::from_body(&body)),
            "diff" => Response::Diff(body.get("json").cloned().unwrap_or(Value::Null)),
            "quit" => Response::Quit(body),
            other => Response::Other(other.to_string()),
        };

        Ok(Self { id, response })
    }
}
