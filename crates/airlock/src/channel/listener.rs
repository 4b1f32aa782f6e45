//! Event stream listener.
//!
//! Owns the inbound stream for the life of the channel and routes each event
//! to the registry entry it answers. Events are handled strictly one at a
//! time: event N+1 is not looked at until event N's handler has run.

use futures::StreamExt;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ChannelState;
use super::event::{InboundMessage, Outcome, Response};
use super::registry::PokeSender;
use super::subscription::Subscription;
use crate::transport::{EventStream, StreamEvent};

/// A terminal delivery, fired after the state lock is released.
#[derive(Debug)]
pub(crate) enum Settlement {
    Poke(PokeSender, Result<(), Value>),
    Refused(Subscription, Value),
    Quit(Subscription, Value),
}

impl Settlement {
    pub fn fire(self) {
        match self {
            Settlement::Poke(sender, result) => {
                if sender.send(result).is_err() {
                    debug!("Poke outcome dropped: caller stopped waiting");
                }
            }
            Settlement::Refused(subscription, error) => subscription.fail(error),
            Settlement::Quit(subscription, message) => subscription.quit(message),
        }
    }
}

/// Drain `stream` until it ends or fails.
pub(crate) async fn run(state: Arc<Mutex<ChannelState>>, mut stream: EventStream, uid: String) {
    info!("Event listener started for channel {}", uid);

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                let settlement = {
                    let mut state = state.lock().await;
                    route(&mut state, event)
                };
                if let Some(settlement) = settlement {
                    settlement.fire();
                }
            }
            Err(e) => {
                // No reconnect: outstanding entries stay registered.
                error!("Event stream for channel {} failed: {}", uid, e);
                break;
            }
        }
    }

    info!("Event listener ended for channel {}", uid);
}

/// Apply one inbound event to the channel state.
///
/// Diffs are delivered in place since their subscription stays registered.
/// Anything that removes an entry is returned so it can fire unlocked.
pub(crate) fn route(state: &mut ChannelState, event: StreamEvent) -> Option<Settlement> {
    if let Some(seq) = event.id {
        state.acks.observe(seq);
    }

    let message = match InboundMessage::parse(&event.data) {
        Ok(message) => message,
        Err(e) => {
            let preview: String = event.data.chars().take(200).collect();
            warn!("Dropping unroutable event ({}): {}", e, preview);
            return None;
        }
    };
    let id = message.id;

    match message.response {
        Response::Poke(outcome) => {
            let Some(sender) = state.registry.take_poke(id) else {
                warn!("Poke response for unknown request {}", id);
                return None;
            };
            let result = match outcome {
                Outcome::Ok => Ok(()),
                Outcome::Err(err) => Err(err),
            };
            Some(Settlement::Poke(sender, result))
        }
        Response::Subscribe(Outcome::Ok) => {
            debug!("Subscription {} acknowledged", id);
            None
        }
        Response::Subscribe(Outcome::Err(err)) => match state.registry.take_subscription(id) {
            Some(subscription) => Some(Settlement::Refused(subscription, err)),
            None => {
                warn!("Subscribe error for unknown request {}", id);
                None
            }
        },
        Response::Diff(data) => {
            match state.registry.subscription_mut(id) {
                Some(subscription) => subscription.deliver(data),
                None => warn!("Diff for unknown subscription {}", id),
            }
            None
        }
        Response::Quit(message) => match state.registry.take_subscription(id) {
            Some(subscription) => Some(Settlement::Quit(subscription, message)),
            None => {
                warn!("Quit for unknown subscription {}", id);
                None
            }
        },
        Response::Other(kind) => {
            debug!("Ignoring '{}' response for request {}", kind, id);
            None
        }
    }
}
