//! Consumer registry and the handles returned to callers
//!
//! Consumers are registered in order and matched against messages by type.
//! Callers keep either a [`Subscription`] (legacy broadcast mode) or a
//! [`ConsumerHandle`] (flow-controlled) to deregister them later. Neither
//! handle deregisters on drop.

use crate::queue::error::HandlerResult;
use crate::queue::manager::Shared;
use crate::queue::message::{Delivery, Payload};
use crate::queue::types::ConsumerStats;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Asynchronous message handler invoked by `flush`
///
/// Closures of the shape `Fn(Delivery<T>) -> impl Future<Output = HandlerResult>`
/// can be registered directly; implement this trait for handlers that carry
/// their own state.
///
/// # Example
///
/// ```rust
/// use mqsim::queue::{Delivery, HandlerResult, MessageHandler, Tagged};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Counter(AtomicUsize);
///
/// #[async_trait::async_trait]
/// impl MessageHandler<Tagged<String>> for Counter {
///     async fn handle(&self, _delivery: Delivery<Tagged<String>>) -> HandlerResult {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, delivery: Delivery<T>) -> HandlerResult;
}

pub(crate) struct FnHandler<F>(pub(crate) F);

#[async_trait]
impl<T, F, Fut> MessageHandler<T> for FnHandler<F>
where
    T: Payload,
    F: Fn(Delivery<T>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, delivery: Delivery<T>) -> HandlerResult {
        (self.0)(delivery).await
    }
}

/// Flow-control settings for [`Queue::consume`](crate::queue::Queue::consume)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Maximum concurrent in-flight messages; `None` is unbounded
    pub prefetch: Option<usize>,
    pub auto_ack: bool,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        Self {
            prefetch: Some(1),
            auto_ack: true,
        }
    }
}

impl ConsumeOptions {
    pub fn unbounded() -> Self {
        Self {
            prefetch: None,
            ..Self::default()
        }
    }

    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }
}

/// What happens to a stopped consumer's in-flight messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    pub requeue_in_flight: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            requeue_in_flight: true,
        }
    }
}

impl StopOptions {
    pub fn discard() -> Self {
        Self {
            requeue_in_flight: false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConsumerCounters {
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl ConsumerCounters {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_nacked(&self) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self, in_flight: usize) -> ConsumerStats {
        ConsumerStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            in_flight,
        }
    }
}

pub(crate) struct ConsumerRecord<T> {
    pub(crate) id: u64,
    pub(crate) message_type: Option<String>,
    pub(crate) prefetch: Option<usize>,
    pub(crate) auto_ack: bool,
    pub(crate) handler: Arc<dyn MessageHandler<T>>,
    pub(crate) counters: Arc<ConsumerCounters>,
}

impl<T> ConsumerRecord<T> {
    /// Catch-all consumers match every message; typed ones need equality
    pub(crate) fn matches(&self, message_type: Option<&str>) -> bool {
        match self.message_type.as_deref() {
            None => true,
            Some(wanted) => message_type == Some(wanted),
        }
    }

    pub(crate) fn has_capacity(&self, in_flight: usize) -> bool {
        match self.prefetch {
            Some(limit) => in_flight < limit,
            None => true,
        }
    }
}

/// Ordered registry of active consumers
pub(crate) struct ConsumerRegistry<T> {
    next_id: u64,
    consumers: Vec<ConsumerRecord<T>>,
    /// Last consumer id chosen per message type for competing delivery
    cursors: HashMap<Option<String>, u64>,
}

impl<T> Default for ConsumerRegistry<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            consumers: Vec::new(),
            cursors: HashMap::new(),
        }
    }
}

impl<T> ConsumerRegistry<T> {
    pub(crate) fn register(
        &mut self,
        message_type: Option<String>,
        prefetch: Option<usize>,
        auto_ack: bool,
        handler: Arc<dyn MessageHandler<T>>,
    ) -> (u64, Arc<ConsumerCounters>) {
        let id = self.next_id;
        self.next_id += 1;
        let counters = Arc::new(ConsumerCounters::default());
        self.consumers.push(ConsumerRecord {
            id,
            message_type,
            prefetch,
            auto_ack,
            handler,
            counters: Arc::clone(&counters),
        });
        (id, counters)
    }

    pub(crate) fn remove(&mut self, consumer_id: u64) -> Option<ConsumerRecord<T>> {
        let index = self.consumers.iter().position(|c| c.id == consumer_id)?;
        Some(self.consumers.remove(index))
    }

    pub(crate) fn get(&self, consumer_id: u64) -> Option<&ConsumerRecord<T>> {
        self.consumers.iter().find(|c| c.id == consumer_id)
    }

    pub(crate) fn contains(&self, consumer_id: u64) -> bool {
        self.get(consumer_id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.consumers.len()
    }

    pub(crate) fn records(&self) -> &[ConsumerRecord<T>] {
        &self.consumers
    }

    /// Indices of consumers matching a message type, in registration order
    pub(crate) fn matching(&self, message_type: Option<&str>) -> Vec<usize> {
        self.consumers
            .iter()
            .enumerate()
            .filter(|(_, consumer)| consumer.matches(message_type))
            .map(|(index, _)| index)
            .collect()
    }

    /// Pick the next consumer with capacity, rotating per message type
    ///
    /// The cursor for the type remembers the id of the last consumer chosen
    /// and only advances when a consumer is selected. Ids grow in
    /// registration order, so the rotation resumes at the first match with a
    /// larger id even after consumers come and go.
    pub(crate) fn select_round_robin(
        &mut self,
        message_type: Option<&str>,
        matching: &[usize],
        has_capacity: impl Fn(&ConsumerRecord<T>) -> bool,
    ) -> Option<usize> {
        if matching.is_empty() {
            return None;
        }
        let key = message_type.map(str::to_string);
        let start = match self.cursors.get(&key) {
            Some(&last) => matching
                .iter()
                .position(|&index| self.consumers[index].id > last)
                .unwrap_or(0),
            None => 0,
        };

        let position = (0..matching.len())
            .map(|offset| (start + offset) % matching.len())
            .find(|&position| has_capacity(&self.consumers[matching[position]]))?;

        let chosen = matching[position];
        self.cursors.insert(key, self.consumers[chosen].id);
        Some(chosen)
    }
}

/// Handle returned by `subscribe`
///
/// Unsubscribing drops the consumer's in-flight messages instead of
/// requeueing them.
#[must_use = "dropping a Subscription leaves the consumer registered with no way to remove it"]
pub struct Subscription<T> {
    queue: Weak<Shared<T>>,
    consumer_id: u64,
    epoch: u64,
}

impl<T: Payload> Subscription<T> {
    pub(crate) fn new(queue: Weak<Shared<T>>, consumer_id: u64, epoch: u64) -> Self {
        Self {
            queue,
            consumer_id,
            epoch,
        }
    }

    pub fn consumer_id(&self) -> u64 {
        self.consumer_id
    }

    /// Deregister the consumer; calling this again does nothing
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.queue.upgrade() {
            shared.stop_consumer(self.consumer_id, self.epoch, StopOptions::discard());
        }
    }

    pub fn is_active(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|shared| shared.has_consumer(self.consumer_id, self.epoch))
    }
}

/// Control handle returned by `consume`
#[must_use = "dropping a ConsumerHandle leaves the consumer registered with no way to stop it"]
pub struct ConsumerHandle<T> {
    queue: Weak<Shared<T>>,
    consumer_id: u64,
    epoch: u64,
    counters: Arc<ConsumerCounters>,
}

impl<T: Payload> ConsumerHandle<T> {
    pub(crate) fn new(
        queue: Weak<Shared<T>>,
        consumer_id: u64,
        epoch: u64,
        counters: Arc<ConsumerCounters>,
    ) -> Self {
        Self {
            queue,
            consumer_id,
            epoch,
            counters,
        }
    }

    pub fn id(&self) -> u64 {
        self.consumer_id
    }

    /// Deregister the consumer, requeueing or discarding its in-flight messages
    pub fn stop(&self, options: StopOptions) {
        if let Some(shared) = self.queue.upgrade() {
            shared.stop_consumer(self.consumer_id, self.epoch, options);
        }
    }

    /// Stop with the default policy of requeueing in-flight messages
    pub fn stop_default(&self) {
        self.stop(StopOptions::default());
    }

    pub fn is_active(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|shared| shared.has_consumer(self.consumer_id, self.epoch))
    }

    pub fn stats(&self) -> ConsumerStats {
        let in_flight = self
            .queue
            .upgrade()
            .map(|shared| shared.consumer_in_flight(self.consumer_id, self.epoch))
            .unwrap_or(0);
        self.counters.stats(in_flight)
    }
}
