//! UI surface switching
//!
//! Two-state machine over the native app UI and an embedded web view.
//! Discovery of the web view is bounded; the native surface is always
//! assumed to exist.

use crate::driver::common::{poll_until, PollConfig};
use crate::driver::traits::AutomationDriver;
use crate::error::{EngineError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Context name of the native surface
pub const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Addressable UI surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    Native,
    Embedded,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Native => f.write_str("native"),
            Surface::Embedded => f.write_str("embedded"),
        }
    }
}

/// Embedded web views follow the `WEBVIEW_*` / `CHROMIUM` naming convention
pub fn is_embedded_context(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.starts_with("WEBVIEW") || upper.starts_with("CHROMIUM")
}

pub struct ContextSwitcher {
    state: Surface,
    poll_interval: Duration,
}

impl ContextSwitcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Surface::Native,
            poll_interval,
        }
    }

    pub fn surface(&self) -> Surface {
        self.state
    }

    /// Wait for an embedded surface to appear and make it active.
    ///
    /// Fails with `ContextNotFound` once `timeout` elapses without one.
    pub async fn switch_to_embedded(
        &mut self,
        driver: &dyn AutomationDriver,
        timeout: Duration,
    ) -> Result<String> {
        if self.state == Surface::Embedded {
            let current = driver.current_context().await?;
            if is_embedded_context(&current) {
                return Ok(current);
            }
        }

        let found = poll_until(
            || async move {
                let contexts = driver.contexts().await?;
                debug!("Available contexts: {:?}", contexts);
                Ok::<_, anyhow::Error>(contexts.into_iter().find(|c| is_embedded_context(c)))
            },
            PollConfig::fixed(timeout, self.poll_interval),
        )
        .await?;

        let Some(name) = found else {
            return Err(EngineError::ContextNotFound {
                timeout_ms: timeout.as_millis() as u64,
            });
        };

        if driver.current_context().await? != name {
            driver.switch_context(&name).await?;
            info!("Switched to embedded surface {}", name);
        }
        self.state = Surface::Embedded;
        Ok(name)
    }

    /// Return to the native surface. Never times out.
    pub async fn switch_to_native(&mut self, driver: &dyn AutomationDriver) -> Result<()> {
        if self.state == Surface::Native {
            return Ok(());
        }

        if driver.current_context().await? != NATIVE_CONTEXT {
            driver.switch_context(NATIVE_CONTEXT).await?;
            info!("Switched to native surface");
        }
        self.state = Surface::Native;
        Ok(())
    }
}
