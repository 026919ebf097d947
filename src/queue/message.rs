//! Message Types for the Simulated Queue
//!
//! Every record in the queue is a caller-supplied payload wrapped in a fixed
//! set of reserved fields. The payload decides its own message type through
//! the [`Payload`] trait; the queue owns everything else.

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::manager::Shared;
use std::ops::Deref;
use std::sync::Weak;

/// Field names the queue reserves on every message record
pub const RESERVED_FIELDS: [&str; 4] = ["id", "type", "attempts", "redelivered"];

/// A message record at some stage of its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<T> {
    /// Identifier assigned at publish time, strictly increasing per queue
    pub id: u64,
    /// Classification used for consumer matching; `None` is the untyped class
    pub message_type: Option<String>,
    /// Number of deliveries that ended in a nack or a requeueing stop
    pub attempts: u32,
    /// True once the message has been requeued at least once
    pub redelivered: bool,
    /// Caller-owned payload
    pub payload: T,
}

impl<T> Message<T> {
    pub(crate) fn stamp(id: u64, payload: T) -> Self
    where
        T: Payload,
    {
        Self {
            id,
            message_type: payload.message_type().map(str::to_string),
            attempts: 0,
            redelivered: false,
            payload,
        }
    }

    pub(crate) fn mark_redelivered(&mut self) {
        self.attempts += 1;
        self.redelivered = true;
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    /// Whether this message satisfies a type filter (`None` accepts any type)
    pub fn matches(&self, filter: Option<&str>) -> bool {
        filter.is_none() || filter == self.message_type()
    }
}

/// Payloads that can travel through a [`Queue`](crate::queue::Queue)
///
/// The type is read once, at publish time. `validate` runs before the
/// message is stamped and may reject payloads that would shadow a reserved
/// field.
pub trait Payload: Clone + Send + 'static {
    fn message_type(&self) -> Option<&str>;

    fn validate(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// A typed body with an explicit message type
///
/// # Example
///
/// ```rust
/// use mqsim::queue::{Queue, Tagged};
///
/// let queue = Queue::new("orders").unwrap();
/// let id = queue.publish(Tagged::new("created", 42u32)).unwrap();
/// assert_eq!(id, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub message_type: Option<String>,
    pub body: T,
}

impl<T> Tagged<T> {
    pub fn new(message_type: impl Into<String>, body: T) -> Self {
        Self {
            message_type: Some(message_type.into()),
            body,
        }
    }

    pub fn untyped(body: T) -> Self {
        Self {
            message_type: None,
            body,
        }
    }
}

impl<T: Clone + Send + 'static> Payload for Tagged<T> {
    fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }
}

/// Open JSON records carry their type in a `"type"` key
impl Payload for serde_json::Value {
    fn message_type(&self) -> Option<&str> {
        self.get("type").and_then(serde_json::Value::as_str)
    }

    fn validate(&self) -> QueueResult<()> {
        let Some(fields) = self.as_object() else {
            return Ok(());
        };

        if let Some(field) = RESERVED_FIELDS
            .iter()
            .filter(|field| **field != "type")
            .find(|field| fields.contains_key(**field))
        {
            return Err(QueueError::ReservedField {
                field: field.to_string(),
            });
        }

        match fields.get("type") {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => Ok(()),
            Some(other) => Err(QueueError::InvalidPayload {
                message: format!("'type' must be a string or null, got {other}"),
            }),
        }
    }
}

/// A message handed out by the queue, remembering who it was delivered to
///
/// Deliveries dereference to their [`Message`] and know how to acknowledge
/// themselves. They hold only a weak reference to the queue, so acking after
/// the queue is dropped does nothing.
pub struct Delivery<T> {
    message: Message<T>,
    consumer_id: Option<u64>,
    tag: u64,
    epoch: u64,
    queue: Weak<Shared<T>>,
}

impl<T> Delivery<T> {
    pub(crate) fn new(
        message: Message<T>,
        consumer_id: Option<u64>,
        tag: u64,
        epoch: u64,
        queue: Weak<Shared<T>>,
    ) -> Self {
        Self {
            message,
            consumer_id,
            tag,
            epoch,
            queue,
        }
    }

    pub fn message(&self) -> &Message<T> {
        &self.message
    }

    pub fn into_message(self) -> Message<T> {
        self.message
    }

    /// Consumer the message is attributed to, `None` for `receive_message`
    pub fn consumer_id(&self) -> Option<u64> {
        self.consumer_id
    }

    pub(crate) fn tag(&self) -> u64 {
        self.tag
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl<T: Payload> Delivery<T> {
    pub fn ack(&self) {
        if let Some(shared) = self.queue.upgrade() {
            shared.ack_delivery(self.tag, self.epoch);
        }
    }

    pub fn nack(&self) {
        if let Some(shared) = self.queue.upgrade() {
            shared.nack_delivery(self.tag, self.epoch);
        }
    }
}

impl<T> Deref for Delivery<T> {
    type Target = Message<T>;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl<T: Clone> Clone for Delivery<T> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            consumer_id: self.consumer_id,
            tag: self.tag,
            epoch: self.epoch,
            queue: Weak::clone(&self.queue),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Delivery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("consumer_id", &self.consumer_id)
            .finish()
    }
}
