//! Best-effort waits
//!
//! These never fail a run. A wait that times out or hits a driver error
//! reports `Degraded` and the caller carries on.

use crate::driver::common::{poll_until, PollConfig};
use crate::driver::traits::{AutomationDriver, Locator};
use log::{debug, warn};
use std::sync::Mutex;
use std::time::Duration;

/// Result of a wait that is not allowed to fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort<T> {
    Settled(T),
    Degraded { reason: String, last: Option<T> },
}

impl<T> BestEffort<T> {
    pub fn is_settled(&self) -> bool {
        matches!(self, BestEffort::Settled(_))
    }

    /// Settled value, or the last value seen before giving up
    pub fn into_value(self) -> Option<T> {
        match self {
            BestEffort::Settled(value) => Some(value),
            BestEffort::Degraded { last, .. } => last,
        }
    }
}

/// Wait for every loading indicator to disappear
pub async fn wait_for_loading_indicators(
    driver: &dyn AutomationDriver,
    indicators: &[Locator],
    timeout: Duration,
    interval: Duration,
) -> BestEffort<()> {
    if indicators.is_empty() {
        return BestEffort::Settled(());
    }

    let result = poll_until(
        || async move {
            for locator in indicators {
                if driver.find_element(locator).await?.is_some() {
                    debug!("Loading indicator {} still present", locator);
                    return Ok::<_, anyhow::Error>(None);
                }
            }
            Ok(Some(()))
        },
        PollConfig::fixed(timeout, interval),
    )
    .await;

    match result {
        Ok(Some(())) => BestEffort::Settled(()),
        Ok(None) => {
            warn!(
                "Loading indicators still visible after {}ms, continuing",
                timeout.as_millis()
            );
            BestEffort::Degraded {
                reason: "loading indicators still visible".to_string(),
                last: None,
            }
        }
        Err(e) => {
            warn!("Loading indicator check failed, continuing: {:#}", e);
            BestEffort::Degraded {
                reason: format!("{:#}", e),
                last: None,
            }
        }
    }
}

/// Wait until two consecutive page snapshots are identical
pub async fn wait_for_stable_snapshot(
    driver: &dyn AutomationDriver,
    timeout: Duration,
    interval: Duration,
) -> BestEffort<String> {
    let previous: Mutex<Option<String>> = Mutex::new(None);
    let previous = &previous;

    let result = poll_until(
        || async move {
            let source = driver.page_source().await?;
            let mut last = previous.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_deref() == Some(source.as_str()) {
                return Ok::<_, anyhow::Error>(Some(source));
            }
            *last = Some(source);
            Ok(None)
        },
        PollConfig::fixed(timeout, interval),
    )
    .await;

    let last = previous.lock().unwrap_or_else(|e| e.into_inner()).take();
    match result {
        Ok(Some(source)) => BestEffort::Settled(source),
        Ok(None) => {
            debug!("Page still changing after {}ms", timeout.as_millis());
            BestEffort::Degraded {
                reason: "page snapshot did not stabilize".to_string(),
                last,
            }
        }
        Err(e) => {
            warn!("Snapshot capture failed, continuing: {:#}", e);
            BestEffort::Degraded {
                reason: format!("{:#}", e),
                last,
            }
        }
    }
}
