//! Queue - the simulated broker queue
//!
//! A `Queue` owns one message store and one consumer registry behind a
//! single lock. Every mutation happens synchronously under that lock; the
//! only suspension points are inside `flush`, which never holds it.

use crate::core::validation::{validate_positive_count, validate_queue_name};
use crate::queue::config::QueueOptions;
use crate::queue::consumer::{
    ConsumeOptions, ConsumerCounters, ConsumerHandle, ConsumerRegistry, FnHandler,
    MessageHandler, StopOptions, Subscription,
};
use crate::queue::error::{HandlerResult, QueueError, QueueResult};
use crate::queue::internal::MessageStore;
use crate::queue::message::{Delivery, Message, Payload};
use crate::queue::types::{LiveView, QueueSnapshot};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything guarded by the queue lock
pub(crate) struct QueueState<T> {
    pub(crate) store: MessageStore<T>,
    pub(crate) registry: ConsumerRegistry<T>,
    /// Bumped by `clear` so handles and deliveries from before it go inert
    pub(crate) epoch: u64,
}

pub(crate) struct Shared<T> {
    pub(crate) name: String,
    pub(crate) options: QueueOptions,
    state: Mutex<QueueState<T>>,
}

impl<T> Shared<T> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // No operation leaves the state half-updated, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ack_delivery(&self, delivery_tag: u64, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        let state = &mut *state;
        let Some(record) = state.store.take_in_flight(delivery_tag) else {
            log::trace!("ack of delivery {} ignored: not in flight", delivery_tag);
            return;
        };
        let message_id = record.message.id;
        if let Some(consumer) = record
            .consumer_id
            .and_then(|id| state.registry.get(id))
        {
            consumer.counters.record_acked();
        }
        state.store.push_acked(record.message);
        log::trace!("Queue '{}' acked message {}", self.name, message_id);
    }

    pub(crate) fn nack_delivery(&self, delivery_tag: u64, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        let state = &mut *state;
        let Some(record) = state.store.take_in_flight(delivery_tag) else {
            log::trace!("nack of delivery {} ignored: not in flight", delivery_tag);
            return;
        };
        let message_id = record.message.id;
        if let Some(consumer) = record
            .consumer_id
            .and_then(|id| state.registry.get(id))
        {
            consumer.counters.record_nacked();
        }
        state.store.requeue(record.message);
        log::debug!("Queue '{}' requeued message {} after nack", self.name, message_id);
    }

    pub(crate) fn stop_consumer(&self, consumer_id: u64, epoch: u64, options: StopOptions) {
        let mut state = self.lock();
        if state.epoch != epoch || state.registry.remove(consumer_id).is_none() {
            return;
        }

        let orphaned = state.store.take_consumer_in_flight(consumer_id);
        let count = orphaned.len();
        if options.requeue_in_flight {
            for message in orphaned {
                state.store.requeue(message);
            }
        }
        log::debug!(
            "Queue '{}' stopped consumer {} ({} in-flight message(s) {})",
            self.name,
            consumer_id,
            count,
            if options.requeue_in_flight {
                "requeued"
            } else {
                "discarded"
            }
        );
    }

    pub(crate) fn has_consumer(&self, consumer_id: u64, epoch: u64) -> bool {
        let state = self.lock();
        state.epoch == epoch && state.registry.contains(consumer_id)
    }

    pub(crate) fn consumer_in_flight(&self, consumer_id: u64, epoch: u64) -> usize {
        let state = self.lock();
        if state.epoch == epoch {
            state.store.in_flight_for(consumer_id)
        } else {
            0
        }
    }
}

/// In-memory queue with ready, in-flight and acked message lists
///
/// `Queue` is a cheap handle; clones share the same queue, so handlers can
/// capture one to publish follow-up messages.
///
/// # Example
///
/// ```rust
/// use mqsim::queue::{FlushOptions, Queue, Tagged};
///
/// # async fn example() -> mqsim::queue::QueueResult<()> {
/// let queue: Queue<Tagged<&str>> = Queue::new("jobs")?;
/// let subscription = queue.subscribe(Some("work"), |delivery| async move {
///     println!("working on {}", delivery.payload.body);
///     Ok(())
/// });
///
/// queue.publish(Tagged::new("work", "resize-image"))?;
/// queue.flush(FlushOptions::default()).await?;
/// assert_eq!(queue.acked_count(), 1);
///
/// subscription.unsubscribe();
/// # Ok(())
/// # }
/// ```
pub struct Queue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.shared.name)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl<T: Payload> Queue<T> {
    pub fn new(name: impl Into<String>) -> QueueResult<Self> {
        Self::with_options(name, QueueOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: QueueOptions) -> QueueResult<Self> {
        let name = name.into();
        validate_queue_name(&name).map_err(|reason| QueueError::InvalidName {
            name: name.clone(),
            reason,
        })?;

        log::debug!(
            "Created queue '{}' ({} delivery)",
            name,
            options.delivery_mode
        );
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                options,
                state: Mutex::new(QueueState {
                    store: MessageStore::default(),
                    registry: ConsumerRegistry::default(),
                    epoch: 0,
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn options(&self) -> &QueueOptions {
        &self.shared.options
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    /// Append a message to the ready list and return its id
    ///
    /// Publishing never runs handlers; call `flush` to deliver.
    pub fn publish(&self, payload: T) -> QueueResult<u64> {
        payload.validate()?;
        let id = self.shared.lock().store.publish(payload);
        log::debug!("Queue '{}' published message {}", self.shared.name, id);
        Ok(id)
    }

    /// Take the earliest ready message matching `message_type`
    ///
    /// With `auto_ack` the message goes straight to acked; otherwise it stays
    /// in flight, unattributed, until acked or nacked.
    pub fn receive_message(&self, message_type: Option<&str>, auto_ack: bool) -> Option<Delivery<T>> {
        let mut state = self.shared.lock();
        let index = state.store.ready_position(message_type)?;
        let message = state.store.remove_ready(index)?;

        let epoch = state.epoch;
        let tag = if auto_ack {
            state.store.push_acked(message.clone());
            state.store.issue_tag()
        } else {
            state.store.push_in_flight(message.clone(), None)
        };
        Some(Delivery::new(
            message,
            None,
            tag,
            epoch,
            Arc::downgrade(&self.shared),
        ))
    }

    pub fn peek_ready(&self, message_type: Option<&str>) -> Option<Message<T>> {
        let state = self.shared.lock();
        state
            .store
            .ready()
            .iter()
            .find(|message| message.matches(message_type))
            .cloned()
    }

    pub fn peek_all_ready(&self, message_type: Option<&str>) -> Vec<Message<T>> {
        let state = self.shared.lock();
        state
            .store
            .ready()
            .iter()
            .filter(|message| message.matches(message_type))
            .cloned()
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.shared.lock().store.ready().len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.lock().store.in_flight().len()
    }

    pub fn acked_count(&self) -> usize {
        self.shared.lock().store.acked().len()
    }

    /// Number of messages published since creation or the last `clear`
    pub fn total_published(&self) -> u64 {
        self.shared.lock().store.published()
    }

    pub fn consumer_count(&self) -> usize {
        self.shared.lock().registry.len()
    }

    /// Deep copy of all three lists, safe to mutate
    pub fn snapshot(&self) -> QueueSnapshot<T> {
        let state = self.shared.lock();
        QueueSnapshot {
            name: self.shared.name.clone(),
            ready: state.store.ready().iter().cloned().collect(),
            in_flight: state.store.in_flight().to_vec(),
            acked: state.store.acked().to_vec(),
        }
    }

    /// Borrow the internal lists without copying
    ///
    /// The view holds the queue lock until dropped.
    pub fn live_view(&self) -> LiveView<'_, T> {
        LiveView {
            guard: self.shared.lock(),
        }
    }

    /// Reset to the state of a freshly constructed queue with the same name
    ///
    /// Subscriptions, consumer handles and deliveries obtained before the
    /// reset no longer affect the queue.
    pub fn clear(&self) {
        let mut state = self.shared.lock();
        state.store = MessageStore::default();
        state.registry = ConsumerRegistry::default();
        state.epoch += 1;
        log::debug!("Queue '{}' cleared", self.shared.name);
    }

    pub fn ack(&self, delivery: &Delivery<T>) {
        self.shared
            .ack_delivery(delivery.tag(), delivery.epoch());
    }

    pub fn nack(&self, delivery: &Delivery<T>) {
        self.shared
            .nack_delivery(delivery.tag(), delivery.epoch());
    }

    /// Register a broadcast-style consumer with unbounded prefetch and auto-ack
    ///
    /// `None` subscribes to every message type.
    pub fn subscribe<F, Fut>(&self, message_type: Option<&str>, handler: F) -> Subscription<T>
    where
        F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_handler(message_type, Arc::new(FnHandler(handler)))
    }

    pub fn subscribe_handler(
        &self,
        message_type: Option<&str>,
        handler: Arc<dyn MessageHandler<T>>,
    ) -> Subscription<T> {
        let (consumer_id, epoch, _) = self.register(message_type, None, true, handler);
        Subscription::new(Arc::downgrade(&self.shared), consumer_id, epoch)
    }

    /// Register a flow-controlled consumer
    ///
    /// Fails with [`QueueError::InvalidPrefetch`] when the prefetch is zero.
    pub fn consume<F, Fut>(
        &self,
        message_type: Option<&str>,
        handler: F,
        options: ConsumeOptions,
    ) -> QueueResult<ConsumerHandle<T>>
    where
        F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.consume_handler(message_type, Arc::new(FnHandler(handler)), options)
    }

    pub fn consume_handler(
        &self,
        message_type: Option<&str>,
        handler: Arc<dyn MessageHandler<T>>,
        options: ConsumeOptions,
    ) -> QueueResult<ConsumerHandle<T>> {
        let prefetch = options
            .prefetch
            .map(|value| {
                validate_positive_count(value).map_err(|_| QueueError::InvalidPrefetch { value })
            })
            .transpose()?;

        let (consumer_id, epoch, counters) =
            self.register(message_type, prefetch, options.auto_ack, handler);
        Ok(ConsumerHandle::new(
            Arc::downgrade(&self.shared),
            consumer_id,
            epoch,
            counters,
        ))
    }

    fn register(
        &self,
        message_type: Option<&str>,
        prefetch: Option<usize>,
        auto_ack: bool,
        handler: Arc<dyn MessageHandler<T>>,
    ) -> (u64, u64, Arc<ConsumerCounters>) {
        let mut state = self.shared.lock();
        let (consumer_id, counters) = state.registry.register(
            message_type.map(str::to_string),
            prefetch,
            auto_ack,
            handler,
        );
        log::debug!(
            "Queue '{}' registered consumer {} for {} (prefetch {:?}, auto_ack {})",
            self.shared.name,
            consumer_id,
            message_type.unwrap_or("all types"),
            prefetch,
            auto_ack
        );
        (consumer_id, state.epoch, counters)
    }
}
