//! Transports a channel runs over.
//!
//! A channel needs exactly two primitives from the outside world: a way to
//! deliver a batch of commands (`send`) and a way to open the single
//! long-lived inbound event stream (`open_stream`). `HttpTransport` provides
//! both over HTTP PUT and server-sent events.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, EventSource};
use std::pin::Pin;
use std::time::Duration;

use crate::channel::Command;
use crate::config::ClientConfig;
use crate::error::{ChannelError, ChannelResult};

/// One event pushed by the server on the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Sequence id carried by the event, if the server sent a numeric one.
    pub id: Option<u64>,
    /// Raw event body.
    pub data: String,
}

impl StreamEvent {
    pub fn new(id: u64, data: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            data: data.into(),
        }
    }
}

/// Stream of inbound channel events.
pub type EventStream = Pin<Box<dyn Stream<Item = ChannelResult<StreamEvent>> + Send>>;

/// The outbound/inbound transport pair a channel is layered on.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver a command batch to the channel URL.
    ///
    /// Completion only means the server accepted the batch; responses to the
    /// commands arrive later on the event stream.
    async fn send(&self, url: &str, cookie: &str, batch: &[Command]) -> ChannelResult<()>;

    /// Open the persistent inbound event stream for the channel URL.
    async fn open_stream(&self, url: &str, cookie: &str) -> ChannelResult<EventStream>;
}

/// HTTP transport: commands as JSON PUT bodies, events as server-sent events.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport from client settings.
    ///
    /// The request timeout applies to command batches only. The event stream
    /// is expected to stay open for the life of the channel.
    pub fn new(config: &ClientConfig) -> ChannelResult<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;

        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, cookie: &str, batch: &[Command]) -> ChannelResult<()> {
        let body = serde_json::to_vec(batch)?;

        let response = self
            .client
            .put(url)
            .timeout(self.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, cookie)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn open_stream(&self, url: &str, cookie: &str) -> ChannelResult<EventStream> {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(COOKIE, cookie);

        let mut es =
            EventSource::new(request).map_err(|e| ChannelError::Stream(e.to_string()))?;
        // Reconnecting would replay events under a stale ack mark.
        es.set_retry_policy(Box::new(Never));

        let stream = es.filter_map(|event| async move {
            match event {
                Ok(Event::Open) => {
                    debug!("Channel event stream opened");
                    None
                }
                Ok(Event::Message(msg)) => Some(Ok(StreamEvent {
                    id: parse_event_id(&msg.id),
                    data: msg.data,
                })),
                Err(e) => Some(Err(ChannelError::Stream(e.to_string()))),
            }
        });

        Ok(Box::pin(stream))
    }
}

fn parse_event_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Ignoring non-numeric event id '{}'", raw);
            None
        }
    }
}
