//! Tests for prefetch flow control while handlers are still running

#[cfg(test)]
mod tests {
    use crate::queue::api::{
        wait_for, ConsumeOptions, Delivery, FlushOptions, HandlerResult, Queue, QueueOptions,
        WaitOptions,
    };
    use crate::queue::tests::{job, Job};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Handler that blocks its first invocation until the returned sender fires
    fn gated_handler(
        calls: &Arc<AtomicUsize>,
    ) -> (
        oneshot::Sender<()>,
        impl Fn(Delivery<Job>) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    ) {
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));
        let calls = Arc::clone(calls);

        let handler = move |_delivery: Delivery<Job>| {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            let fut: BoxFuture<'static, HandlerResult> = Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let waiter = gate.lock().unwrap().take();
                if let Some(waiter) = waiter {
                    let _ = waiter.await;
                }
                let settled: HandlerResult = Ok(());
                settled
            });
            fut
        };
        (release, handler)
    }

    #[tokio::test]
    async fn test_prefetch_one_holds_second_message_until_ack() {
        let queue: Queue<Job> = Queue::new("prefetch").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, handler) = gated_handler(&calls);
        let handle = queue
            .consume(Some("work"), handler, ConsumeOptions::default())
            .unwrap();

        queue.publish(job("work", "a")).unwrap();
        queue.publish(job("work", "b")).unwrap();

        let flushing = queue.clone();
        let flush = tokio::spawn(async move { flushing.flush(FlushOptions::default()).await });

        wait_for(|| calls.load(Ordering::SeqCst) == 1, WaitOptions::timeout_ms(500))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.in_flight_count(), 1);
        assert_eq!(queue.ready_count(), 1);
        assert_eq!(handle.stats().in_flight, 1);

        release.send(()).unwrap();
        flush.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(queue.acked_count(), 2);
        assert_eq!(queue.ready_count(), 0);
    }

    #[tokio::test]
    async fn test_prefetch_bounds_each_dispatch_pass() {
        let queue: Queue<Job> = Queue::with_options("batches", QueueOptions::competing()).unwrap();
        let peak = Arc::new(AtomicUsize::new(0));
        let observer = queue.clone();
        let peak_seen = Arc::clone(&peak);
        let _handle = queue
            .consume(
                Some("work"),
                move |_delivery: Delivery<Job>| {
                    peak_seen.fetch_max(observer.in_flight_count(), Ordering::SeqCst);
                    std::future::ready(Ok(()))
                },
                ConsumeOptions::default().prefetch(3),
            )
            .unwrap();

        for n in 0..10 {
            queue.publish(job("work", &n.to_string())).unwrap();
        }
        queue.flush(FlushOptions::default()).await.unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(queue.acked_count(), 10);
    }

    #[tokio::test]
    async fn test_receive_is_not_limited_by_prefetch() {
        let queue: Queue<Job> = Queue::new("manual").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_release, handler) = gated_handler(&calls);
        let _handle = queue
            .consume(Some("work"), handler, ConsumeOptions::default())
            .unwrap();

        queue.publish(job("manual", "a")).unwrap();
        queue.publish(job("manual", "b")).unwrap();

        let first = queue.receive_message(Some("manual"), false).unwrap();
        let second = queue.receive_message(Some("manual"), false).unwrap();
        assert_eq!(queue.in_flight_count(), 2);
        assert_eq!((first.id, second.id), (0, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
