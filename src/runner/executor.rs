//! Self-healing command executor
//!
//! A command is tried against, in order: the cached selector for its
//! page/element/strategy, its own selector, and finally a selector suggested
//! by the translation backend from a fresh page snapshot. Whatever works is
//! written back to the cache under its own strategy.

use crate::ai::{snapshot, Action, Command, Translator};
use crate::cache::{AppCache, CacheKey};
use crate::driver::context::Surface;
use crate::driver::resolver::ElementResolver;
use crate::driver::traits::{AutomationDriver, ElementHandle};
use crate::error::{EngineError, Result};
use crate::selector::name::extract_name;
use crate::selector::strategy::classify;
use crate::utils::config::{ms, EngineConfig};
use log::{debug, info, warn};
use std::time::Duration;

/// Where the selector that finally worked came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorSource {
    Cache,
    Direct,
    Healed,
}

/// Successful execution of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub final_selector: String,
    pub source: SelectorSource,
}

pub struct SelfHealingExecutor<'a> {
    driver: &'a dyn AutomationDriver,
    translator: &'a dyn Translator,
    config: &'a EngineConfig,
}

impl<'a> SelfHealingExecutor<'a> {
    pub fn new(
        driver: &'a dyn AutomationDriver,
        translator: &'a dyn Translator,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            driver,
            translator,
            config,
        }
    }

    /// Execute one command on the active surface.
    ///
    /// Fails with `ElementNotFound` only once cache, direct and healed
    /// attempts are all exhausted.
    pub async fn execute(
        &self,
        command: &Command,
        cache: &AppCache,
        page_name: &str,
        surface: Surface,
        original_step: &str,
    ) -> Result<Execution> {
        let element_name = extract_name(original_step);
        let key = CacheKey::new(
            page_name,
            &element_name,
            classify(command.selector.as_deref()),
        );

        // 1. Cached selector, tried at most once
        if let Some(cached) = cache.get(&key) {
            debug!("Cache hit {} -> {}", key, cached);
            match self
                .attempt(command, &cached, surface, ms(self.config.cache_timeout_ms))
                .await
            {
                Ok(()) => {
                    return Ok(self
                        .finish(cache, page_name, &element_name, cached, SelectorSource::Cache)
                        .await)
                }
                Err(e) => {
                    warn!("Cached selector '{}' failed ({}), invalidating", cached, e);
                    if let Err(e) = cache.invalidate(&key) {
                        warn!("Could not invalidate {}: {}", key, e);
                    }
                }
            }
        }

        // 2. The command's own selector
        match command.selector.as_deref().map(str::trim) {
            Some(selector) if !selector.is_empty() => {
                match self
                    .attempt(command, selector, surface, ms(self.config.element_timeout_ms))
                    .await
                {
                    Ok(()) => {
                        let selector = selector.to_string();
                        return Ok(self
                            .finish(cache, page_name, &element_name, selector, SelectorSource::Direct)
                            .await);
                    }
                    Err(e) => info!("Selector '{}' failed ({}), healing", selector, e),
                }
            }
            _ => debug!("No selector for '{}', healing", original_step),
        }

        // 3. Heal from a fresh snapshot
        let healed = self.heal(original_step).await?;
        let element = self
            .resolver()
            .resolve_within(Some(&healed), surface, ms(self.config.heal_timeout_ms))
            .await
            .map_err(|e| {
                warn!("Healed selector '{}' failed: {}", healed, e);
                EngineError::element_not_found(original_step)
            })?;
        self.perform(command, &element).await?;
        info!("Healed '{}' with {}", original_step, healed);

        Ok(self
            .finish(cache, page_name, &element_name, healed, SelectorSource::Healed)
            .await)
    }

    fn resolver(&self) -> ElementResolver<'a> {
        ElementResolver::new(self.driver)
    }

    async fn attempt(
        &self,
        command: &Command,
        selector: &str,
        surface: Surface,
        timeout: Duration,
    ) -> Result<()> {
        let element = self
            .resolver()
            .resolve_within(Some(selector), surface, timeout)
            .await?;
        self.perform(command, &element).await
    }

    async fn heal(&self, original_step: &str) -> Result<String> {
        let raw = self.driver.page_source().await?;
        let reduced = snapshot::reduce(&raw, self.config.snapshot_max_chars);
        let suggestion = self
            .translator
            .suggest_selector(original_step, &reduced)
            .await?;
        Ok(crate::ai::sanitize_selector(&suggestion))
    }

    async fn perform(&self, command: &Command, element: &ElementHandle) -> Result<()> {
        match command.action {
            Action::Click => self.driver.click(element).await?,
            Action::SetValue => {
                self.driver
                    .set_value(element, command.value.as_deref().unwrap_or_default())
                    .await?
            }
            Action::VerifyVisible => {
                if !self.driver.is_displayed(element).await? {
                    return Err(EngineError::resolution(element.locator.to_string()));
                }
            }
            Action::LaunchApp => {}
        }
        Ok(())
    }

    /// Record the selector that worked under its own strategy, then settle
    async fn finish(
        &self,
        cache: &AppCache,
        page_name: &str,
        element_name: &str,
        final_selector: String,
        source: SelectorSource,
    ) -> Execution {
        let key = CacheKey::new(page_name, element_name, classify(Some(&final_selector)));
        if let Err(e) = cache.put(&key, &final_selector) {
            warn!("Could not persist selector for {}: {}", key, e);
        }
        self.driver.pause(ms(self.config.action_settle_ms)).await;

        Execution {
            final_selector,
            source,
        }
    }
}
