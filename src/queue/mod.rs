//! Simulated Message Queue
//!
//! A deterministic, in-memory stand-in for a message broker queue, meant for
//! unit-testing code that publishes, consumes and acknowledges messages.
//!
//! # Overview
//!
//! - **Lifecycle**: every message is ready, in flight, or acked; nack and
//!   requeueing stops send it back to ready as a redelivery
//! - **Delivery modes**: broadcast (every matching consumer gets every
//!   message) or competing (exactly one consumer per message, round-robin)
//! - **Flow control**: per-consumer prefetch limits concurrent in-flight
//!   messages
//! - **Deterministic scheduling**: publishing never runs handlers; `flush`
//!   delivers and drives every handler to completion, collecting failures
//!
//! # Architecture
//!
//! ```text
//!   publish()                                          ack() / auto-ack
//!      │                                                    │
//!      ▼                                                    ▼
//! ┌─────────┐   flush(): dispatch pass   ┌───────────┐   ┌───────┐
//! │  ready  │ ─────────────────────────► │ in-flight │ ─►│ acked │
//! │ (FIFO)  │ ◄───────────────────────── │ (by owner)│   └───────┘
//! └─────────┘   nack() / stop(requeue)   └─────┬─────┘
//!                                              │ handler futures
//!                                              ▼
//!                                  ┌───────────────────────┐
//!                                  │ consumers (registry)  │
//!                                  │  type filter, prefetch│
//!                                  └───────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use mqsim::queue::{ConsumeOptions, FlushOptions, Queue, QueueOptions, Tagged};
//! use std::sync::{Arc, Mutex};
//!
//! # async fn example() -> mqsim::queue::QueueResult<()> {
//! let queue: Queue<Tagged<i32>> = Queue::with_options("work", QueueOptions::competing())?;
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let log = Arc::clone(&seen);
//! let worker = queue.consume(
//!     Some("job"),
//!     move |delivery| {
//!         let log = Arc::clone(&log);
//!         async move {
//!             log.lock().unwrap().push(delivery.payload.body);
//!             Ok(())
//!         }
//!     },
//!     ConsumeOptions::default(),
//! )?;
//!
//! queue.publish(Tagged::new("job", 1))?;
//! queue.publish(Tagged::new("job", 2))?;
//! queue.flush(FlushOptions::default()).await?;
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! assert_eq!(worker.stats().acked, 2);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod config;
mod consumer;
mod dispatch;
pub(crate) mod error;
mod internal;
mod manager;
mod message;
mod typed;
mod types;

pub use config::{DeliveryMode, FlushOptions, QueueOptions};
pub use consumer::{ConsumeOptions, ConsumerHandle, MessageHandler, StopOptions, Subscription};
pub use error::{AggregateError, HandlerError, HandlerFailure, HandlerResult, QueueError, QueueResult};
pub use manager::Queue;
pub use message::{Delivery, Message, Payload, Tagged, RESERVED_FIELDS};
pub use types::{ConsumerStats, InFlightMessage, LiveView, QueueSnapshot};

#[cfg(test)]
mod tests;
