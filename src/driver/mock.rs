//! Scripted in-memory driver for engine tests

use crate::driver::context::NATIVE_CONTEXT;
use crate::driver::traits::{AutomationDriver, ElementHandle, Locator, Platform};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    elements: Vec<Locator>,
    failing_clicks: HashSet<Locator>,
    hidden: HashSet<Locator>,
    click_navigations: HashMap<Locator, String>,
    contexts: Vec<String>,
    current_context: String,
    switch_count: usize,
    page_sources: VecDeque<String>,
    queries: Vec<Locator>,
    clicks: Vec<Locator>,
    values: Vec<(Locator, String)>,
    pauses: Vec<Duration>,
}

/// Clones share state, so a test can keep a handle after moving one into
/// the orchestrator.
#[derive(Clone)]
pub struct MockDriver {
    platform: Platform,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new(platform: Platform) -> Self {
        let state = MockState {
            contexts: vec![NATIVE_CONTEXT.to_string()],
            current_context: NATIVE_CONTEXT.to_string(),
            ..MockState::default()
        };
        Self {
            platform,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn android() -> Self {
        Self::new(Platform::Android)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_element(&self, locator: Locator) {
        self.state().elements.push(locator);
    }

    /// Keep the element findable but report it as not displayed
    pub fn hide_element(&self, locator: &Locator) {
        self.state().hidden.insert(locator.clone());
    }

    pub fn fail_clicks_on(&self, locator: Locator) {
        self.state().failing_clicks.insert(locator);
    }

    /// Clicking `locator` moves the session to `context`, as a link out of a
    /// web view would
    pub fn navigate_on_click(&self, locator: Locator, context: &str) {
        self.state()
            .click_navigations
            .insert(locator, context.to_string());
    }

    pub fn add_context(&self, name: &str) {
        self.state().contexts.push(name.to_string());
    }

    /// Queue page sources; the last one keeps being returned
    pub fn push_page_source(&self, source: &str) {
        self.state().page_sources.push_back(source.to_string());
    }

    pub fn current_context_name(&self) -> String {
        self.state().current_context.clone()
    }

    pub fn switch_count(&self) -> usize {
        self.state().switch_count
    }

    pub fn queries(&self) -> Vec<Locator> {
        self.state().queries.clone()
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.state().clicks.clone()
    }

    pub fn values(&self) -> Vec<(Locator, String)> {
        self.state().values.clone()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.state().pauses.clone()
    }
}

#[async_trait]
impl AutomationDriver for MockDriver {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let mut state = self.state();
        state.queries.push(locator.clone());
        Ok(state
            .elements
            .iter()
            .position(|l| l == locator)
            .map(|idx| ElementHandle {
                element_id: format!("el-{}", idx),
                locator: locator.clone(),
            }))
    }

    async fn wait_for_exist(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        self.find_element(locator).await
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool> {
        let state = self.state();
        Ok(state.elements.contains(&element.locator) && !state.hidden.contains(&element.locator))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state();
        if state.failing_clicks.contains(&element.locator) {
            anyhow::bail!("stale element {}", element.element_id);
        }
        state.clicks.push(element.locator.clone());
        if let Some(context) = state.click_navigations.get(&element.locator).cloned() {
            state.current_context = context;
        }
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.state()
            .values
            .push((element.locator.clone(), value.to_string()));
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>> {
        Ok(self.state().contexts.clone())
    }

    async fn current_context(&self) -> Result<String> {
        Ok(self.state().current_context.clone())
    }

    async fn switch_context(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if !state.contexts.iter().any(|c| c == name) {
            anyhow::bail!("No such context: {}", name);
        }
        state.current_context = name.to_string();
        state.switch_count += 1;
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        let mut state = self.state();
        if state.page_sources.len() > 1 {
            return Ok(state.page_sources.pop_front().unwrap_or_default());
        }
        Ok(state
            .page_sources
            .front()
            .cloned()
            .unwrap_or_else(|| "<hierarchy/>".to_string()))
    }

    async fn pause(&self, duration: Duration) {
        self.state().pauses.push(duration);
    }
}
