//! Predicate polling with a wall-clock timeout
//!
//! Used by assertion helpers that wait for a queue to reach some state, e.g.
//! a message of a given type showing up in the ready list.

use crate::queue::error::{QueueError, QueueResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Polling interval used unless overridden
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timeout used unless overridden
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn timeout_ms(timeout_ms: u64) -> Self {
        Self::timeout(Duration::from_millis(timeout_ms))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Poll `predicate` until it returns true or the timeout elapses
///
/// The predicate is checked once before the first sleep, so an already
/// satisfied condition returns without waiting.
///
/// # Examples
/// ```rust
/// use mqsim::core::wait::{wait_for, WaitOptions};
/// use mqsim::queue::{Queue, Tagged};
///
/// # async fn example() -> mqsim::queue::QueueResult<()> {
/// let queue = Queue::new("events")?;
/// queue.publish(Tagged::new("tick", ()))?;
/// wait_for(|| queue.ready_count() == 1, WaitOptions::timeout_ms(100)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn wait_for<F>(mut predicate: F, options: WaitOptions) -> QueueResult<()>
where
    F: FnMut() -> bool,
{
    wait_for_async(move || std::future::ready(predicate()), options).await
}

/// Like [`wait_for`], with a predicate that is itself asynchronous
pub async fn wait_for_async<F, Fut>(mut predicate: F, options: WaitOptions) -> QueueResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + options.timeout;

    loop {
        if predicate().await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            log::debug!("Wait condition still false after {:?}", options.timeout);
            return Err(QueueError::Timeout {
                timeout_ms: options.timeout.as_millis(),
            });
        }
        sleep(options.interval).await;
    }
}
