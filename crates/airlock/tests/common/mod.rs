//! Test utilities: a scripted in-memory transport.

#![allow(dead_code)]

use airlock::channel::Command;
use airlock::{
    Channel, ChannelError, ChannelResult, Connection, EventStream, StreamEvent, Transport,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Transport that records every batch and plays back pushed events.
///
/// Events pushed before the stream is opened are buffered, the way the
/// server queues events for a channel nobody is listening on yet.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

struct Inner {
    batches: Mutex<Vec<(String, String, Vec<Command>)>>,
    opened: AtomicUsize,
    failing: AtomicBool,
    refusing_stream: AtomicBool,
    next_seq: AtomicU64,
    push_tx: mpsc::UnboundedSender<ChannelResult<StreamEvent>>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<ChannelResult<StreamEvent>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                batches: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                refusing_stream: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                push_tx,
                push_rx: Mutex::new(Some(push_rx)),
            }),
        }
    }

    /// Push an event body with the next sequence id. Returns that id.
    pub fn push(&self, body: Value) -> u64 {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .push_tx
            .send(Ok(StreamEvent::new(seq, body.to_string())))
            .unwrap();
        seq
    }

    /// Make the stream fail.
    pub fn push_error(&self, message: &str) {
        self.inner
            .push_tx
            .send(Err(ChannelError::Stream(message.to_string())))
            .unwrap();
    }

    /// Make subsequent sends fail with a 500.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Make subsequent stream opens fail while sends still succeed.
    pub fn set_refusing_stream(&self, refusing: bool) {
        self.inner.refusing_stream.store(refusing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<Command>> {
        self.inner
            .batches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, batch)| batch.clone())
            .collect()
    }

    pub fn last_batch(&self) -> Vec<Command> {
        self.batches().pop().expect("nothing was sent")
    }

    /// URL and cookie of the last send.
    pub fn last_target(&self) -> (String, String) {
        let batches = self.inner.batches.lock().unwrap();
        let (url, cookie, _) = batches.last().expect("nothing was sent");
        (url.clone(), cookie.clone())
    }

    pub fn open_count(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, url: &str, cookie: &str, batch: &[Command]) -> ChannelResult<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Status {
                url: url.to_string(),
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        self.inner
            .batches
            .lock()
            .unwrap()
            .push((url.to_string(), cookie.to_string(), batch.to_vec()));
        Ok(())
    }

    async fn open_stream(&self, _url: &str, _cookie: &str) -> ChannelResult<EventStream> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        if self.inner.refusing_stream.load(Ordering::SeqCst) {
            return Err(ChannelError::Stream("refused".to_string()));
        }
        let rx = self
            .inner
            .push_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChannelError::Stream("stream already opened".to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

pub fn test_connection() -> Connection {
    Connection::new("zod", "http://localhost", 8080, "urbauth-~zod=0v1.abc")
}

/// A channel over a fresh scripted transport.
pub fn test_channel() -> (Channel, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let channel = Channel::new(test_connection(), transport.clone());
    (channel, transport)
}

/// Wait until the listener has seen event `seq`.
pub async fn wait_for_event(channel: &Channel, seq: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while channel.last_event_id().await < seq {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener never saw the event");
}

/// Wait until the listener has stopped reading the stream.
pub async fn wait_for_listener_exit(channel: &Channel) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while channel.is_listening().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener never stopped");
}

/// Receive with a deadline.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("queue closed")
}
