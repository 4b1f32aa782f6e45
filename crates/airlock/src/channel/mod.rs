//! The channel: a duplex session over an outbound command transport and an
//! inbound event stream.
//!
//! ## Flow
//!
//! ```text
//! poke/subscribe/unsubscribe
//!     │ allocate id, register handler          (registry)
//!     ▼
//! dispatch ── prepend ack if one is due ──▶ Transport::send   (ack)
//!     │
//!     ▼
//! ensure_connected ── first time only ──▶ Transport::open_stream
//!                                              │
//!                        listener task ◀───────┘
//!                          observe seq, parse, route by id     (listener)
//! ```
//!
//! Every command is registered before it is handed to the transport, so a
//! response can never arrive ahead of its handler.
//!
//! Entries for pokes that are never answered, and subscriptions that are
//! never quit, stay registered for the life of the channel. Nothing times
//! them out.

mod ack;
mod command;
mod event;
mod id;
mod listener;
mod registry;
mod subscription;

pub use command::Command;
pub use id::{channel_url, generate_uid};
pub use subscription::{Subscription, SubscriptionHandler};

use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ChannelError, ChannelResult};
use crate::transport::{HttpTransport, Transport};
use crate::types::{Cage, Connection, SubscriptionEvent};

use ack::AckTracker;
use registry::Registry;

/// Mutable protocol state shared by the send path and the listener.
#[derive(Debug, Default)]
pub(crate) struct ChannelState {
    pub registry: Registry,
    pub acks: AckTracker,
}

/// A poke that has been sent and is waiting for the server's answer.
#[derive(Debug)]
pub struct PendingPoke {
    id: u64,
    rx: oneshot::Receiver<Result<(), Value>>,
}

impl PendingPoke {
    /// Request id the poke was sent under.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the server's answer.
    ///
    /// Never times out: a poke the server does not answer stays pending.
    pub async fn outcome(self) -> ChannelResult<()> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ChannelError::PokeRejected(err)),
            Err(_) => Err(ChannelError::Closed),
        }
    }
}

/// A channel session.
///
/// Request ids, registries and ack state are per channel, so any number of
/// channels can run side by side. Share one across tasks with `Arc`.
pub struct Channel {
    uid: String,
    url: String,
    connection: Connection,
    transport: Arc<dyn Transport>,
    state: Arc<Mutex<ChannelState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    /// Create a channel over `transport`. Nothing is sent until the first
    /// command.
    pub fn new(connection: Connection, transport: impl Transport) -> Self {
        let uid = generate_uid();
        let url = channel_url(&connection, &uid);
        debug!("Created channel {} at {}", uid, url);

        Self {
            uid,
            url,
            connection,
            transport: Arc::new(transport),
            state: Arc::new(Mutex::new(ChannelState::default())),
            listener: Mutex::new(None),
        }
    }

    /// Create a channel over HTTP.
    pub fn over_http(connection: Connection, config: &ClientConfig) -> ChannelResult<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(connection, transport))
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Send a poke and wait for the server's answer.
    pub async fn poke(&self, app: &str, cage: Cage) -> ChannelResult<()> {
        self.start_poke(app, cage).await?.outcome().await
    }

    /// Send a poke without waiting for the answer.
    pub async fn start_poke(&self, app: &str, cage: Cage) -> ChannelResult<PendingPoke> {
        let (tx, rx) = oneshot::channel();
        let id = self.state.lock().await.registry.insert_poke(tx);

        let command = Command::Poke {
            id,
            ship: self.connection.ship.clone(),
            app: app.to_string(),
            mark: cage.mark,
            json: cage.data,
        };

        if let Err(e) = self.dispatch(command).await {
            self.state.lock().await.registry.take_poke(id);
            return Err(e);
        }

        Ok(PendingPoke { id, rx })
    }

    /// Subscribe to `path` on `app`. Returns the request id, which is also
    /// the handle for [`Channel::unsubscribe`].
    pub async fn subscribe(
        &self,
        app: &str,
        path: &str,
        subscription: Subscription,
    ) -> ChannelResult<u64> {
        let id = self
            .state
            .lock()
            .await
            .registry
            .insert_subscription(subscription);

        let command = Command::Subscribe {
            id,
            ship: self.connection.ship.clone(),
            app: app.to_string(),
            path: path.to_string(),
        };

        if let Err(e) = self.dispatch(command).await {
            self.state.lock().await.registry.take_subscription(id);
            return Err(e);
        }

        Ok(id)
    }

    /// Subscribe and receive the subscription's events on a queue.
    pub async fn subscribe_events(
        &self,
        app: &str,
        path: &str,
        mark: &str,
    ) -> ChannelResult<(u64, mpsc::UnboundedReceiver<SubscriptionEvent>)> {
        let (subscription, rx) = Subscription::channel(mark);
        let id = self.subscribe(app, path, subscription).await?;
        Ok((id, rx))
    }

    /// Ask the server to end `subscription`. Returns the id of the
    /// unsubscribe command itself.
    ///
    /// The subscription stays registered, and may still see diffs, until the
    /// server answers with a quit.
    pub async fn unsubscribe(&self, subscription: u64) -> ChannelResult<u64> {
        let id = self.state.lock().await.registry.next_id();
        self.dispatch(Command::Unsubscribe { id, subscription }).await?;
        Ok(id)
    }

    /// Open the inbound event stream unless it is already open.
    ///
    /// Called after every successful send; the stream is opened at most once
    /// per channel and never reopened.
    pub async fn ensure_connected(&self) -> ChannelResult<()> {
        let mut handle = self.listener.lock().await;
        if handle.is_some() {
            return Ok(());
        }

        let stream = self
            .transport
            .open_stream(&self.url, &self.connection.cookie)
            .await?;
        info!("Connected to event stream for channel {}", self.uid);

        *handle = Some(tokio::spawn(listener::run(
            Arc::clone(&self.state),
            stream,
            self.uid.clone(),
        )));
        Ok(())
    }

    /// Whether the inbound stream has been opened.
    pub async fn is_connected(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    /// Whether the listener is still reading the stream. False before the
    /// stream is opened and after it ended or failed.
    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of pokes still waiting for an answer.
    pub async fn pending_pokes(&self) -> usize {
        self.state.lock().await.registry.poke_count()
    }

    pub async fn has_subscription(&self, id: u64) -> bool {
        self.state.lock().await.registry.has_subscription(id)
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.registry.subscription_count()
    }

    /// Sequence id of the last event seen on the stream (0 before any).
    pub async fn last_event_id(&self) -> u64 {
        self.state.lock().await.acks.last_observed()
    }

    /// Sequence id of the last event acked to the server (0 before any).
    pub async fn last_acked_event_id(&self) -> u64 {
        self.state.lock().await.acks.last_acked()
    }

    /// Send `command`, then make sure the stream is open.
    ///
    /// Only a send failure is returned. Once the batch is accepted the server
    /// holds the command, so a stream that fails to open is logged and
    /// retried on the next send.
    async fn dispatch(&self, command: Command) -> ChannelResult<()> {
        let pending_ack = self.state.lock().await.acks.take_pending();
        let batch = ack::batch(pending_ack, command);
        debug!(
            "Sending {} command(s) on channel {}: {:?}",
            batch.len(),
            self.uid,
            batch.iter().map(Command::action).collect::<Vec<_>>()
        );

        let sent = self
            .transport
            .send(&self.url, &self.connection.cookie, &batch)
            .await;

        // Only an accepted batch moves the ack mark.
        if let Some(event_id) = pending_ack {
            let mut state = self.state.lock().await;
            match sent {
                Ok(()) => state.acks.commit(event_id),
                Err(_) => state.acks.release(event_id),
            }
        }
        sent?;

        if let Err(e) = self.ensure_connected().await {
            warn!(
                "Command accepted but event stream for channel {} did not open: {}",
                self.uid, e
            );
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("uid", &self.uid)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
