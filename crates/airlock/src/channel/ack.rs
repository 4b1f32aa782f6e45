//! Event acknowledgment policy.
//!
//! The server keeps every pushed event queued until it is acked. Rather than
//! spending a request per ack, the latest observed event id rides along at
//! the front of the next outbound batch.

use super::command::Command;

/// Tracks the last event seen on the stream and the last one acked.
///
/// An ack handed to a batch is in flight until that batch is accepted or
/// fails, so overlapping sends do not carry the same ack twice.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AckTracker {
    last_observed: u64,
    last_acked: u64,
    in_flight: Option<u64>,
}

impl AckTracker {
    /// Record the sequence id of an inbound event.
    pub fn observe(&mut self, event_id: u64) {
        self.last_observed = event_id;
    }

    /// Event id to ack with the next send, if anything arrived since the
    /// last ack and no batch already carries it.
    pub fn pending(&self) -> Option<u64> {
        let due = self.last_observed != self.last_acked
            && self.in_flight != Some(self.last_observed);
        due.then_some(self.last_observed)
    }

    /// Hand the due ack, if any, to an outbound batch.
    pub fn take_pending(&mut self) -> Option<u64> {
        let event_id = self.pending()?;
        self.in_flight = Some(event_id);
        Some(event_id)
    }

    /// Mark `event_id` as acked once the batch carrying it was accepted.
    ///
    /// Batches may complete out of order, so the mark never moves backwards.
    pub fn commit(&mut self, event_id: u64) {
        self.last_acked = self.last_acked.max(event_id);
        if self.in_flight.is_some_and(|id| id <= self.last_acked) {
            self.in_flight = None;
        }
    }

    /// The batch carrying `event_id` failed; the ack is due again.
    pub fn release(&mut self, event_id: u64) {
        if self.in_flight == Some(event_id) {
            self.in_flight = None;
        }
    }

    pub fn last_observed(&self) -> u64 {
        self.last_observed
    }

    pub fn last_acked(&self) -> u64 {
        self.last_acked
    }
}

/// Build the outbound batch for `command`, led by an ack when one is due.
pub fn batch(ack: Option<u64>, command: Command) -> Vec<Command> {
    match ack {
        Some(event_id) => vec![Command::Ack { event_id }, command],
        None => vec![command],
    }
}
