//! Internal message store holding the three lifecycle lists
//!
//! This module provides the bookkeeping the queue engine mutates under its
//! lock:
//! - the ready list in FIFO order
//! - in-flight records with their owning consumer and delivery tag
//! - the acked list in acknowledgement order
//! - id assignment and per-consumer in-flight counts

use crate::queue::message::{Message, Payload};
use crate::queue::types::InFlightMessage;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub(crate) struct MessageStore<T> {
    /// Next id to hand out; starts at 0
    next_id: u64,
    /// Next delivery tag; tags are never reused before a reset
    next_tag: u64,
    ready: VecDeque<Message<T>>,
    in_flight: Vec<InFlightMessage<T>>,
    acked: Vec<Message<T>>,
    /// In-flight record count per attributed consumer
    in_flight_by_consumer: HashMap<u64, usize>,
}

impl<T> Default for MessageStore<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            next_tag: 0,
            ready: VecDeque::new(),
            in_flight: Vec::new(),
            acked: Vec::new(),
            in_flight_by_consumer: HashMap::new(),
        }
    }
}

impl<T> MessageStore<T> {
    pub(crate) fn publish(&mut self, payload: T) -> u64
    where
        T: Payload,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.ready.push_back(Message::stamp(id, payload));
        id
    }

    /// Number of messages published since creation or the last reset
    pub(crate) fn published(&self) -> u64 {
        self.next_id
    }

    pub(crate) fn ready(&self) -> &VecDeque<Message<T>> {
        &self.ready
    }

    pub(crate) fn in_flight(&self) -> &[InFlightMessage<T>] {
        &self.in_flight
    }

    pub(crate) fn acked(&self) -> &[Message<T>] {
        &self.acked
    }

    pub(crate) fn ready_position(&self, filter: Option<&str>) -> Option<usize> {
        self.ready.iter().position(|message| message.matches(filter))
    }

    pub(crate) fn remove_ready(&mut self, index: usize) -> Option<Message<T>> {
        self.ready.remove(index)
    }

    pub(crate) fn in_flight_for(&self, consumer_id: u64) -> usize {
        self.in_flight_by_consumer
            .get(&consumer_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn issue_tag(&mut self) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    /// Record a delivery and return the tag identifying it
    pub(crate) fn push_in_flight(&mut self, message: Message<T>, consumer_id: Option<u64>) -> u64 {
        if let Some(id) = consumer_id {
            *self.in_flight_by_consumer.entry(id).or_insert(0) += 1;
        }
        let delivery_tag = self.issue_tag();
        self.in_flight.push(InFlightMessage {
            message,
            consumer_id,
            delivery_tag,
        });
        delivery_tag
    }

    pub(crate) fn push_acked(&mut self, message: Message<T>) {
        self.acked.push(message);
    }

    /// Return a message to the tail of the ready list as a redelivery
    pub(crate) fn requeue(&mut self, mut message: Message<T>) {
        message.mark_redelivered();
        self.ready.push_back(message);
    }

    /// Remove the in-flight record created for one delivery
    ///
    /// A message redelivered to the same consumer gets a fresh tag, so a late
    /// settle of the earlier delivery finds nothing.
    pub(crate) fn take_in_flight(&mut self, delivery_tag: u64) -> Option<InFlightMessage<T>> {
        let index = self
            .in_flight
            .iter()
            .position(|record| record.delivery_tag == delivery_tag)?;
        let record = self.in_flight.remove(index);
        self.release(record.consumer_id);
        Some(record)
    }

    /// Remove every in-flight record owned by a consumer, preserving order
    pub(crate) fn take_consumer_in_flight(&mut self, consumer_id: u64) -> Vec<Message<T>> {
        let (owned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|record| record.consumer_id == Some(consumer_id));
        self.in_flight = kept;
        self.in_flight_by_consumer.remove(&consumer_id);
        owned.into_iter().map(|record| record.message).collect()
    }

    fn release(&mut self, consumer_id: Option<u64>) {
        let Some(id) = consumer_id else {
            return;
        };
        if let Some(count) = self.in_flight_by_consumer.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight_by_consumer.remove(&id);
            }
        }
    }
}
