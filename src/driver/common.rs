//! Polling helpers shared by the drivers and the engine
//!
//! Every wait in the engine is bounded: each helper here gives up once its
//! timeout has elapsed.

use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            initial_interval_ms: 100,
            max_interval_ms: 500,
            use_exponential_backoff: true,
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Fixed-interval polling without backoff
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = (interval.as_millis() as u64).max(1);
        Self {
            timeout_ms: timeout.as_millis() as u64,
            initial_interval_ms: interval_ms,
            max_interval_ms: interval_ms,
            use_exponential_backoff: false,
        }
    }
}

/// Poll `check_fn` until it yields a value or the timeout elapses.
///
/// The check always runs at least once, so a zero timeout still performs a
/// single attempt. Errors from the check abort polling immediately.
pub async fn poll_until<T, E, F, Fut>(check_fn: F, config: PollConfig) -> Result<Option<T>, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut interval = config.initial_interval_ms;

    loop {
        if let Some(value) = check_fn().await? {
            return Ok(Some(value));
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }

        let remaining = timeout - elapsed;
        tokio::time::sleep(Duration::from_millis(interval).min(remaining)).await;

        if config.use_exponential_backoff {
            interval = (interval * 3 / 2).min(config.max_interval_ms);
        }
    }
}

/// Poll a boolean condition until it holds or the timeout elapses.
pub async fn wait_until<F, Fut>(check_fn: F, config: PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let outcome: Result<Option<()>, std::convert::Infallible> = poll_until(
        || {
            let fut = check_fn();
            async move { Ok(fut.await.then_some(())) }
        },
        config,
    )
    .await;
    matches!(outcome, Ok(Some(())))
}
