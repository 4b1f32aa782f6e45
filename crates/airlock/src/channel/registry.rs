//! Outstanding operation registries and the request id allocator.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

use super::subscription::Subscription;

/// Settles a poke: `Ok` on success, `Err` with the server's error payload.
pub(crate) type PokeSender = oneshot::Sender<Result<(), Value>>;

/// Request ids and the callers waiting on them.
///
/// Ids come from one sequence shared by every command kind, start at 1 and
/// are never reused, so an id identifies at most one entry for the life of
/// the channel.
#[derive(Debug)]
pub(crate) struct Registry {
    next_id: u64,
    pokes: HashMap<u64, PokeSender>,
    subscriptions: HashMap<u64, Subscription>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            next_id: 1,
            pokes: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }
}

impl Registry {
    /// Allocate the next request id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocate an id and register a poke under it.
    pub fn insert_poke(&mut self, sender: PokeSender) -> u64 {
        let id = self.next_id();
        self.pokes.insert(id, sender);
        id
    }

    /// Allocate an id and register a subscription under it.
    pub fn insert_subscription(&mut self, subscription: Subscription) -> u64 {
        let id = self.next_id();
        self.subscriptions.insert(id, subscription);
        id
    }

    pub fn take_poke(&mut self, id: u64) -> Option<PokeSender> {
        self.pokes.remove(&id)
    }

    pub fn subscription_mut(&mut self, id: u64) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&id)
    }

    pub fn take_subscription(&mut self, id: u64) -> Option<Subscription> {
        self.subscriptions.remove(&id)
    }

    pub fn poke_count(&self) -> usize {
        self.pokes.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn has_subscription(&self, id: u64) -> bool {
        self.subscriptions.contains_key(&id)
    }
}
