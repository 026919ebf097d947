//! Typed access to JSON record payloads
//!
//! Queues carrying `serde_json::Value` records behave like the duck-typed
//! queues of dynamic test suites. These helpers move between those records
//! and strongly-typed structs.

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::manager::Queue;
use crate::queue::message::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const PREVIEW_LEN: usize = 100;

impl Message<Value> {
    /// Deserialize the record into `U`
    ///
    /// The `"type"` key stays part of the record, so `U` may either declare
    /// it or ignore unknown fields.
    pub fn decode<U: DeserializeOwned>(&self) -> QueueResult<U> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            let data = self.payload.to_string();
            let data_preview = if data.len() > PREVIEW_LEN {
                let truncated = &data.as_bytes()[..PREVIEW_LEN];
                format!("{}...", String::from_utf8_lossy(truncated))
            } else {
                data.clone()
            };

            QueueError::Deserialization {
                message: format!(
                    "Failed to deserialize message to {}: {} | id: {}, type: '{}' | data_length: {}, data_preview: '{}'",
                    std::any::type_name::<U>(),
                    e,
                    self.id,
                    self.message_type().unwrap_or("<untyped>"),
                    data.len(),
                    data_preview
                ),
            }
        })
    }
}

impl Queue<Value> {
    /// Serialize `body` into a record and publish it
    ///
    /// `body` must serialize to a JSON object. A `message_type` is written
    /// into its `"type"` key, replacing any existing value.
    pub fn publish_serialized<S: Serialize>(
        &self,
        message_type: Option<&str>,
        body: &S,
    ) -> QueueResult<u64> {
        let mut record = serde_json::to_value(body).map_err(|e| QueueError::InvalidPayload {
            message: e.to_string(),
        })?;
        if !record.is_object() {
            return Err(QueueError::InvalidPayload {
                message: format!("expected a JSON object, got {record}"),
            });
        }
        if let (Some(message_type), Some(fields)) = (message_type, record.as_object_mut()) {
            fields.insert("type".to_string(), Value::String(message_type.to_string()));
        }
        self.publish(record)
    }
}
