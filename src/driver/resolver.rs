use crate::driver::context::Surface;
use crate::driver::traits::{AutomationDriver, ElementHandle, Locator};
use crate::error::{EngineError, Result};
use crate::selector::query::SelectorForm;
use log::debug;
use std::time::Duration;

/// Turns selector strings into live elements for the active surface
pub struct ElementResolver<'d> {
    driver: &'d dyn AutomationDriver,
}

impl<'d> ElementResolver<'d> {
    pub fn new(driver: &'d dyn AutomationDriver) -> Self {
        Self { driver }
    }

    /// Build the native query for a selector without touching the session
    pub fn locator_for(&self, selector: Option<&str>, surface: Surface) -> Result<Locator> {
        let selector = selector.unwrap_or_default();
        SelectorForm::parse(selector, surface)
            .map(|form| form.to_locator(self.driver.platform()))
            .ok_or_else(|| EngineError::resolution(selector))
    }

    /// Resolve with a single query
    pub async fn resolve(&self, selector: Option<&str>, surface: Surface) -> Result<ElementHandle> {
        let locator = self.locator_for(selector, surface)?;
        debug!("Resolving {} on {} surface", locator, surface);
        self.driver
            .find_element(&locator)
            .await?
            .ok_or_else(|| EngineError::resolution(selector.unwrap_or_default()))
    }

    /// Resolve with a bounded existence wait
    pub async fn resolve_within(
        &self,
        selector: Option<&str>,
        surface: Surface,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        let locator = self.locator_for(selector, surface)?;
        debug!(
            "Waiting up to {}ms for {} on {} surface",
            timeout.as_millis(),
            locator,
            surface
        );
        self.driver
            .wait_for_exist(&locator, timeout)
            .await?
            .ok_or_else(|| EngineError::resolution(selector.unwrap_or_default()))
    }
}
