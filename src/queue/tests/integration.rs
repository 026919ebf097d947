//! Integration tests driving a queue the way a service test suite would

#[cfg(test)]
mod tests {
    use crate::core::logging::init_test_logging;
    use crate::queue::api::{
        wait_for, ConsumeOptions, Delivery, DeliveryMode, FlushOptions, HandlerResult, Queue,
        QueueOptions, Tagged, WaitOptions,
    };
    use serial_test::serial;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Order { id: u32, total: u32 },
        Shipment { order_id: u32 },
    }

    type EventQueue = Queue<Tagged<Event>>;

    fn order(id: u32, total: u32) -> Tagged<Event> {
        Tagged::new("order", Event::Order { id, total })
    }

    #[tokio::test]
    #[serial]
    async fn test_order_pipeline_from_toml_config() {
        init_test_logging();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delivery_mode = \"competing\"").unwrap();
        writeln!(file, "fail_fast = false").unwrap();
        let options = QueueOptions::from_file(file.path()).unwrap();
        assert_eq!(options.delivery_mode, DeliveryMode::Competing);

        let queue: EventQueue = Queue::with_options("orders", options).unwrap();
        let revenue = Arc::new(AtomicU32::new(0));
        let shipped = Arc::new(Mutex::new(Vec::new()));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let revenue = Arc::clone(&revenue);
                let publisher = queue.clone();
                queue
                    .consume(
                        Some("order"),
                        move |delivery: Delivery<Tagged<Event>>| {
                            let result: HandlerResult = match &delivery.payload.body {
                                Event::Order { id, total } => {
                                    revenue.fetch_add(*total, Ordering::SeqCst);
                                    let shipment = Event::Shipment { order_id: *id };
                                    publisher
                                        .publish(Tagged::new("shipment", shipment))
                                        .map(|_| ())
                                        .map_err(Into::into)
                                }
                                Event::Shipment { .. } => Err("unexpected shipment".into()),
                            };
                            std::future::ready(result)
                        },
                        ConsumeOptions::default(),
                    )
                    .unwrap()
            })
            .collect();

        let sink = Arc::clone(&shipped);
        let _shipping = queue.subscribe(Some("shipment"), move |delivery: Delivery<Tagged<Event>>| {
            if let Event::Shipment { order_id } = &delivery.payload.body {
                sink.lock().unwrap().push(*order_id);
            }
            std::future::ready(Ok(()))
        });

        for id in 1..=4 {
            queue.publish(order(id, id * 10)).unwrap();
        }
        timeout(Duration::from_secs(1), queue.flush(FlushOptions::default()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(revenue.load(Ordering::SeqCst), 100);
        let mut shipments = shipped.lock().unwrap().clone();
        shipments.sort_unstable();
        assert_eq!(shipments, vec![1, 2, 3, 4]);
        assert_eq!(workers[0].stats().acked, 2);
        assert_eq!(workers[1].stats().acked, 2);
        assert_eq!(queue.acked_count(), 8);
        assert_eq!(queue.snapshot().total(), 8);
    }

    #[tokio::test]
    async fn test_wait_for_background_flush() {
        let queue: EventQueue = Queue::new("background").unwrap();
        let seen = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&seen);
        let _sub = queue.subscribe(None, move |_delivery: Delivery<Tagged<Event>>| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let handled: HandlerResult = Ok(());
                handled
            }
        });

        for id in 0..3 {
            queue.publish(order(id, 1)).unwrap();
        }
        let flushing = queue.clone();
        let flush = tokio::spawn(async move { flushing.flush(FlushOptions::default()).await });

        wait_for(
            || queue.acked_count() == 3,
            WaitOptions::timeout_ms(500).with_interval(Duration::from_millis(2)),
        )
        .await
        .unwrap();

        flush.await.unwrap().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_times_out_on_idle_queue() {
        let queue: EventQueue = Queue::new("idle").unwrap();
        queue.publish(order(1, 1)).unwrap();

        let result = wait_for(|| queue.acked_count() == 1, WaitOptions::timeout_ms(30)).await;

        let error = result.unwrap_err();
        assert!(error.to_string().contains("30ms"), "got: {error}");
        assert_eq!(queue.ready_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_between_test_cases() {
        let queue: EventQueue = Queue::new("reused").unwrap();
        let _sub = queue.subscribe(None, |_delivery: Delivery<Tagged<Event>>| {
            std::future::ready(Ok(()))
        });
        queue.publish(order(1, 1)).unwrap();
        queue.flush(FlushOptions::default()).await.unwrap();

        queue.clear();
        queue.publish(order(2, 2)).unwrap();
        queue.flush(FlushOptions::default()).await.unwrap();

        // The old subscription was cleared away with everything else
        assert_eq!(queue.consumer_count(), 0);
        assert_eq!(queue.ready_count(), 1);
        assert_eq!(queue.peek_ready(None).unwrap().id, 0);
        assert_eq!(queue.acked_count(), 0);
    }
}
