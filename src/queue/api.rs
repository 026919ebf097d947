//! Public API for the queue system
//!
//! External modules should import from here rather than directly from internal modules.
//! See module documentation for complete usage examples and architecture details.

// Core queue engine
pub use crate::queue::manager::Queue;

// Configuration
pub use crate::queue::config::{DeliveryMode, FlushOptions, QueueOptions};

// Consumers and their handles
pub use crate::queue::consumer::{
    ConsumeOptions, ConsumerHandle, MessageHandler, StopOptions, Subscription,
};

// Message types
pub use crate::queue::message::{Delivery, Message, Payload, Tagged};

// Inspection
pub use crate::queue::types::{ConsumerStats, InFlightMessage, LiveView, QueueSnapshot};

// Error handling
pub use crate::queue::error::{
    AggregateError, HandlerError, HandlerFailure, HandlerResult, QueueError, QueueResult,
};

// Waiting on queue state
pub use crate::core::wait::{wait_for, wait_for_async, WaitOptions};
