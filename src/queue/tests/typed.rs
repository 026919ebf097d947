//! Tests for JSON record queues and typed decoding

#[cfg(test)]
mod tests {
    use crate::queue::api::{Delivery, FlushOptions, HandlerResult, Queue, QueueError};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order_id: u32,
        customer: String,
    }

    fn queue() -> Queue<Value> {
        Queue::new("records").unwrap()
    }

    #[test]
    fn test_publish_serialized_sets_type() {
        let queue = queue();
        let order = OrderPlaced {
            order_id: 7,
            customer: "ada".to_string(),
        };

        let id = queue.publish_serialized(Some("order.placed"), &order).unwrap();

        let message = queue.peek_ready(Some("order.placed")).unwrap();
        assert_eq!(message.id, id);
        assert_eq!(message.payload["type"], "order.placed");
        assert_eq!(message.decode::<OrderPlaced>().unwrap(), order);
    }

    #[test]
    fn test_publish_serialized_without_type() {
        let queue = queue();
        queue
            .publish_serialized(None, &json!({ "order_id": 1, "customer": "bob" }))
            .unwrap();

        let message = queue.peek_ready(None).unwrap();
        assert_eq!(message.message_type(), None);
        assert_eq!(message.decode::<OrderPlaced>().unwrap().order_id, 1);
    }

    #[test]
    fn test_publish_serialized_requires_object() {
        let queue = queue();

        let result = queue.publish_serialized(Some("numbers"), &vec![1, 2, 3]);

        assert!(matches!(result, Err(QueueError::InvalidPayload { .. })));
        assert_eq!(queue.total_published(), 0);
    }

    #[test]
    fn test_publish_serialized_checks_reserved_fields() {
        let queue = queue();

        let result = queue.publish_serialized(Some("bad"), &json!({ "attempts": 3 }));

        assert!(matches!(result, Err(QueueError::ReservedField { .. })));
    }

    #[test]
    fn test_decode_failure_reports_context() {
        let queue = queue();
        queue
            .publish(json!({ "type": "order.placed", "order_id": "not-a-number" }))
            .unwrap();

        let message = queue.peek_ready(None).unwrap();
        let error = message.decode::<OrderPlaced>().unwrap_err();

        let text = error.to_string();
        assert!(matches!(error, QueueError::Deserialization { .. }));
        assert!(text.contains("OrderPlaced"), "got: {text}");
        assert!(text.contains("type: 'order.placed'"), "got: {text}");
        assert!(text.contains("not-a-number"), "got: {text}");
    }

    #[test]
    fn test_decode_preview_is_truncated() {
        let queue = queue();
        queue
            .publish(json!({ "type": "blob", "data": "x".repeat(500) }))
            .unwrap();

        let error = queue
            .peek_ready(None)
            .unwrap()
            .decode::<OrderPlaced>()
            .unwrap_err();

        let text = error.to_string();
        assert!(text.contains("..."), "got: {text}");
        assert!(!text.contains(&"x".repeat(200)), "preview should be cut short");
    }

    #[test]
    fn test_non_string_type_is_rejected() {
        let queue = queue();

        let result = queue.publish(json!({ "type": 42 }));

        assert!(matches!(result, Err(QueueError::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_handlers_decode_records() {
        let queue = queue();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let _sub = queue.subscribe(Some("order.placed"), move |delivery: Delivery<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                let order: OrderPlaced = delivery.decode()?;
                sink.lock().unwrap().push(order.customer);
                let handled: HandlerResult = Ok(());
                handled
            }
        });

        for (order_id, customer) in [(1, "ada"), (2, "grace")] {
            let order = OrderPlaced {
                order_id,
                customer: customer.to_string(),
            };
            queue.publish_serialized(Some("order.placed"), &order).unwrap();
        }
        queue.publish(json!({ "type": "order.placed", "order_id": false })).unwrap();

        let error = queue.flush(FlushOptions::default()).await.unwrap_err();

        assert_eq!(*received.lock().unwrap(), vec!["ada", "grace"]);
        assert_eq!(error.handler_failures().len(), 1);
        assert_eq!(error.handler_failures()[0].message_id, 2);
    }
}
