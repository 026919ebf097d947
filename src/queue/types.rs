//! Inspection types for the queue system
//!
//! Snapshots are deep copies that the caller owns. The live view borrows the
//! queue's internal lists under its lock and must be dropped before any other
//! queue call is made from the same task.

use crate::queue::manager::QueueState;
use crate::queue::message::Message;
use std::collections::VecDeque;
use std::sync::MutexGuard;

/// A message currently delivered and awaiting ack or nack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightMessage<T> {
    pub message: Message<T>,
    /// Owning consumer, `None` when taken through `receive_message`
    pub consumer_id: Option<u64>,
    /// Identifies this particular delivery of the message
    pub delivery_tag: u64,
}

/// Owned copy of a queue's three lifecycle lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot<T> {
    pub name: String,
    pub ready: Vec<Message<T>>,
    pub in_flight: Vec<InFlightMessage<T>>,
    pub acked: Vec<Message<T>>,
}

impl<T> QueueSnapshot<T> {
    pub fn total(&self) -> usize {
        self.ready.len() + self.in_flight.len() + self.acked.len()
    }
}

/// Zero-copy, read-only view of the queue's internal lists
///
/// Holds the queue lock for its whole lifetime. Any other queue operation
/// attempted while a view is alive blocks, so never hold one across an
/// `.await`.
pub struct LiveView<'a, T> {
    pub(crate) guard: MutexGuard<'a, QueueState<T>>,
}

impl<T> LiveView<'_, T> {
    pub fn ready(&self) -> &VecDeque<Message<T>> {
        self.guard.store.ready()
    }

    pub fn in_flight(&self) -> &[InFlightMessage<T>] {
        self.guard.store.in_flight()
    }

    pub fn acked(&self) -> &[Message<T>] {
        self.guard.store.acked()
    }
}

/// Point-in-time counters for one consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub in_flight: usize,
}
