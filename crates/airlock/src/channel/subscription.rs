//! Subscription handlers.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::{Cage, SubscriptionEvent};

/// Receives everything the server says about one subscription.
///
/// Called from the channel's event listener, one event at a time. Handlers
/// run while the listener holds the channel state, so they should hand work
/// off rather than block.
pub trait SubscriptionHandler: Send + 'static {
    /// A diff arrived. May be called any number of times.
    fn on_event(&mut self, cage: Cage);

    /// The server refused the subscription. Terminal.
    fn on_error(&mut self, error: Value);

    /// The server ended the subscription. Terminal.
    fn on_quit(&mut self, message: Value);
}

impl SubscriptionHandler for mpsc::UnboundedSender<SubscriptionEvent> {
    fn on_event(&mut self, cage: Cage) {
        let _ = self.send(SubscriptionEvent::Event(cage));
    }

    fn on_error(&mut self, error: Value) {
        let _ = self.send(SubscriptionEvent::Error(error));
    }

    fn on_quit(&mut self, message: Value) {
        let _ = self.send(SubscriptionEvent::Quit(message));
    }
}

/// An outstanding subscription: the mark its diffs are expected to carry and
/// the handler they are delivered to.
pub struct Subscription {
    mark: String,
    handler: Box<dyn SubscriptionHandler>,
}

impl Subscription {
    pub fn new(mark: impl Into<String>, handler: impl SubscriptionHandler) -> Self {
        Self {
            mark: mark.into(),
            handler: Box::new(handler),
        }
    }

    /// Subscription that forwards into an unbounded queue.
    pub fn channel(mark: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<SubscriptionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(mark, tx), rx)
    }

    pub fn mark(&self) -> &str {
        &self.mark
    }

    pub(crate) fn deliver(&mut self, data: Value) {
        let cage = Cage::new(self.mark.clone(), data);
        self.handler.on_event(cage);
    }

    // Terminal deliveries consume the subscription so they can fire only once.
    pub(crate) fn fail(mut self, error: Value) {
        self.handler.on_error(error);
    }

    pub(crate) fn quit(mut self, message: Value) {
        self.handler.on_quit(message);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("mark", &self.mark)
            .finish_non_exhaustive()
    }
}
