//! Dispatch scheduler driving handlers to completion
//!
//! `flush` alternates between two steps until neither makes progress:
//!
//! 1. a synchronous dispatch pass over the ready list, under the queue lock,
//!    that moves deliverable messages in flight and queues handler futures
//! 2. awaiting the earliest pending handler, whose settlement may free
//!    prefetch capacity or requeue a message through nack
//!
//! Handler futures live in a `FuturesUnordered` owned by the flush call, so
//! nothing runs on a background task and a flush is fully deterministic for a
//! given set of handlers.
//!
//! With fail-fast on, each pass delivers a single message and its handlers
//! are polled once on the spot. A handler that fails before suspending halts
//! dispatch while later messages are still ready.

use crate::queue::config::{DeliveryMode, FlushOptions};
use crate::queue::consumer::MessageHandler;
use crate::queue::error::{AggregateError, HandlerFailure, HandlerResult, QueueError, QueueResult};
use crate::queue::manager::{Queue, QueueState, Shared};
use crate::queue::message::{Delivery, Message, Payload};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::{Arc, Weak};

/// Outcome of one handler invocation, reported back to the scheduler
struct Settled {
    message_id: u64,
    delivery_tag: u64,
    message_type: Option<String>,
    consumer_id: u64,
    auto_ack: bool,
    epoch: u64,
    result: HandlerResult,
}

/// Failures gathered by one flush and whether dispatch has halted
struct Outcome {
    fail_fast: bool,
    halted: bool,
    failures: Vec<HandlerFailure>,
}

impl Outcome {
    fn record(&mut self, queue: &str, failure: HandlerFailure) {
        log::warn!("Queue '{}': {}", queue, failure);
        self.failures.push(failure);
        if self.fail_fast && !self.halted {
            log::debug!("Queue '{}' halting dispatch after first failure", queue);
            self.halted = true;
        }
    }
}

struct Invocation<T> {
    handler: Arc<dyn MessageHandler<T>>,
    delivery: Delivery<T>,
    consumer_id: u64,
    auto_ack: bool,
}

impl<T: Payload> Invocation<T> {
    fn run(self) -> BoxFuture<'static, Settled> {
        let Invocation {
            handler,
            delivery,
            consumer_id,
            auto_ack,
        } = self;
        let message_id = delivery.id;
        let delivery_tag = delivery.tag();
        let message_type = delivery.message_type.clone();
        let epoch = delivery.epoch();

        async move {
            let result = handler.handle(delivery).await;
            Settled {
                message_id,
                delivery_tag,
                message_type,
                consumer_id,
                auto_ack,
                epoch,
                result,
            }
        }
        .boxed()
    }
}

impl<T: Payload> Queue<T> {
    /// Deliver every deliverable message and wait for all handlers to settle
    ///
    /// Messages requeued by a nack during the flush are delivered again in
    /// the same call. Handler failures never escape synchronously; they are
    /// returned here as [`QueueError::HandlerFailures`], or as
    /// [`QueueError::Handler`] carrying the first failure when error capture
    /// is disabled.
    ///
    /// A handler that nacks every delivery keeps its message cycling, so such
    /// a flush only ends once the handler stops nacking.
    pub async fn flush(&self, options: FlushOptions) -> QueueResult<()> {
        let (fail_fast, capture_errors) = options.resolve(self.options());
        let mut pending: FuturesUnordered<BoxFuture<'static, Settled>> = FuturesUnordered::new();
        let mut outcome = Outcome {
            fail_fast,
            halted: false,
            failures: Vec::new(),
        };
        let mut dispatched = 0usize;

        loop {
            if !outcome.halted {
                let invocations = self.dispatch_pass(fail_fast);
                if !invocations.is_empty() {
                    dispatched += invocations.len();
                    for invocation in invocations {
                        let mut future = invocation.run();
                        let settled = if fail_fast {
                            future.as_mut().now_or_never()
                        } else {
                            None
                        };
                        match settled {
                            Some(settled) => {
                                if let Some(failure) = self.settle(settled) {
                                    outcome.record(self.name(), failure);
                                }
                            }
                            None => pending.push(future),
                        }
                    }
                    continue;
                }
            }

            let Some(settled) = pending.next().await else {
                break;
            };
            if let Some(failure) = self.settle(settled) {
                outcome.record(self.name(), failure);
            }
        }

        let mut failures = outcome.failures;
        log::debug!(
            "Queue '{}' flush finished: {} deliveries, {} failure(s), {} still ready",
            self.name(),
            dispatched,
            failures.len(),
            self.ready_count()
        );

        if failures.is_empty() {
            Ok(())
        } else if capture_errors {
            Err(QueueError::HandlerFailures(AggregateError { failures }))
        } else {
            let first = failures.swap_remove(0);
            Err(QueueError::Handler(first))
        }
    }

    /// Alias for [`flush`](Self::flush)
    pub async fn drain(&self, options: FlushOptions) -> QueueResult<()> {
        self.flush(options).await
    }

    /// One FIFO scan of the ready list
    ///
    /// `single` stops the scan after the first message that was delivered.
    fn dispatch_pass(&self, single: bool) -> Vec<Invocation<T>> {
        let shared = self.shared();
        let weak = Arc::downgrade(shared);
        let mut guard = shared.lock();
        let state = &mut *guard;
        let mut invocations = Vec::new();
        let mut index = 0;

        while let Some(message) = state.store.ready().get(index) {
            let message_type = message.message_type.clone();
            let matching = state.registry.matching(message_type.as_deref());
            if matching.is_empty() {
                index += 1;
                continue;
            }

            let selected = match shared.options.delivery_mode {
                DeliveryMode::Broadcast => select_broadcast(state, &matching),
                DeliveryMode::Competing => select_competing(state, message_type.as_deref(), &matching),
            };
            if selected.is_empty() {
                index += 1;
                continue;
            }

            // Removal shifts the next message into `index`
            let Some(message) = state.store.remove_ready(index) else {
                break;
            };
            for consumer_index in selected {
                invocations.push(deliver(state, consumer_index, &message, &weak));
            }
            if single {
                break;
            }
        }

        if !invocations.is_empty() {
            log::trace!(
                "Queue '{}' dispatch pass queued {} handler call(s)",
                shared.name,
                invocations.len()
            );
        }
        invocations
    }

    /// Apply auto-ack for a successful handler, or turn an error into a failure
    fn settle(&self, settled: Settled) -> Option<HandlerFailure> {
        match settled.result {
            Ok(()) => {
                if settled.auto_ack {
                    self.shared().ack_delivery(settled.delivery_tag, settled.epoch);
                }
                None
            }
            Err(source) => Some(HandlerFailure {
                consumer_id: settled.consumer_id,
                message_id: settled.message_id,
                message_type: settled.message_type,
                source,
            }),
        }
    }
}

/// All matching consumers, or none if any of them is saturated
fn select_broadcast<T>(state: &QueueState<T>, matching: &[usize]) -> Vec<usize> {
    let consumers = state.registry.records();
    let all_free = matching.iter().all(|&index| {
        let consumer = &consumers[index];
        consumer.has_capacity(state.store.in_flight_for(consumer.id))
    });
    if all_free {
        matching.to_vec()
    } else {
        Vec::new()
    }
}

fn select_competing<T>(
    state: &mut QueueState<T>,
    message_type: Option<&str>,
    matching: &[usize],
) -> Vec<usize> {
    let store = &state.store;
    state
        .registry
        .select_round_robin(message_type, matching, |consumer| {
            consumer.has_capacity(store.in_flight_for(consumer.id))
        })
        .into_iter()
        .collect()
}

fn deliver<T: Payload>(
    state: &mut QueueState<T>,
    consumer_index: usize,
    message: &Message<T>,
    queue: &Weak<Shared<T>>,
) -> Invocation<T> {
    let consumer = &state.registry.records()[consumer_index];
    let consumer_id = consumer.id;
    let auto_ack = consumer.auto_ack;
    let handler = Arc::clone(&consumer.handler);
    consumer.counters.record_delivered();

    log::trace!(
        "Delivering message {} to consumer {}",
        message.id,
        consumer_id
    );
    let tag = state.store.push_in_flight(message.clone(), Some(consumer_id));

    Invocation {
        handler,
        delivery: Delivery::new(
            message.clone(),
            Some(consumer_id),
            tag,
            state.epoch,
            Weak::clone(queue),
        ),
        consumer_id,
        auto_ack,
    }
}
