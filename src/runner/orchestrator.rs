//! Page-aware orchestrator
//!
//! Runs the steps of one test strictly in order against one automation
//! session, tracking the current page and the active UI surface. The first
//! failing action step ends the run.

use super::events::{EventEmitter, RunEvent};
use super::executor::{SelectorSource, SelfHealingExecutor};
use super::state::{ExecutionContext, RunSummary, RunTally, StepOutcome, StepStatus};
use super::steps::{Step, StepKind};
use super::waits;
use crate::ai::{snapshot, Command, Translator};
use crate::cache::AppCache;
use crate::driver::context::{ContextSwitcher, Surface};
use crate::driver::resolver::ElementResolver;
use crate::driver::traits::AutomationDriver;
use crate::error::{EngineError, Result};
use crate::selector::name::extract_name;
use crate::utils::config::{ms, EngineConfig};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

pub struct Orchestrator {
    run_id: String,
    driver: Box<dyn AutomationDriver>,
    translator: Arc<dyn Translator>,
    cache: AppCache,
    config: EngineConfig,
    switcher: ContextSwitcher,
    context: ExecutionContext,
    emitter: EventEmitter,
    /// Commands translated ahead of time by a page-load step, keyed by the
    /// index of the step they belong to
    prefetched: Option<(usize, Vec<Command>)>,
}

impl Orchestrator {
    pub fn new(
        driver: Box<dyn AutomationDriver>,
        translator: Arc<dyn Translator>,
        cache: AppCache,
        config: EngineConfig,
    ) -> Self {
        let switcher = ContextSwitcher::new(ms(config.context_poll_interval_ms));
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            driver,
            translator,
            cache,
            config,
            switcher,
            context: ExecutionContext::default(),
            emitter: EventEmitter::default(),
            prefetched: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.emitter.subscribe()
    }

    /// Run steps in order, sending every outcome to `outcomes`.
    ///
    /// Outcomes stop after the first failed step.
    pub async fn run(
        &mut self,
        steps: &[Step],
        outcomes: &mpsc::UnboundedSender<StepOutcome>,
    ) -> RunSummary {
        let mut tally = RunTally::new(&self.run_id, steps.len());
        self.emitter.emit(RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            app_id: self.cache.app_id().to_string(),
            total_steps: steps.len(),
        });

        for (idx, step) in steps.iter().enumerate() {
            let step_number = step.ordinal_index;
            let started = Instant::now();
            let _ = outcomes.send(StepOutcome::running(step_number));
            self.emitter.emit(RunEvent::StepStarted {
                step_number,
                text: step.text.clone(),
            });

            let outcome = match self.run_step(idx, steps).await {
                Ok(()) => StepOutcome::passed(step_number),
                Err(e) => {
                    error!("Step {} failed: {}", step_number, e);
                    StepOutcome::failed(step_number, e.to_string())
                }
            };

            tally.record(&outcome);
            let failed = outcome.status == StepStatus::Failed;
            let _ = outcomes.send(outcome.clone());
            self.emitter.emit(RunEvent::StepFinished {
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            if failed {
                break;
            }
        }

        let summary = tally.finish();
        info!(
            "Run {} finished: {} passed, {} failed, {} not run",
            summary.run_id, summary.passed, summary.failed, summary.not_run
        );
        self.emitter.emit(RunEvent::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    async fn run_step(&mut self, idx: usize, steps: &[Step]) -> Result<()> {
        let step = &steps[idx];
        match step.kind() {
            StepKind::Launch => {
                debug!("Launch step, settling");
                self.driver.pause(ms(self.config.launch_settle_ms)).await;
                Ok(())
            }
            StepKind::PageLoad { page, surface } => {
                self.page_load(idx, steps, page, surface).await;
                Ok(())
            }
            StepKind::Action => self.action_step(idx, step).await,
        }
    }

    /// Structural wait. Never fails; degrades to a timed pause.
    async fn page_load(
        &mut self,
        idx: usize,
        steps: &[Step],
        page: Option<String>,
        surface: Option<Surface>,
    ) {
        let step_number = steps[idx].ordinal_index;

        if let Some(surface) = surface {
            if let Err(e) = self.ensure_surface(surface, step_number).await {
                warn!("Could not switch to {} surface: {}", surface, e);
            }
            return;
        }

        if let Some(page) = page {
            info!("Now on page '{}'", page);
            self.context.current_page_name = page;
        }

        if !self.preresolve_next(idx, steps).await {
            self.driver.pause(ms(self.config.page_load_settle_ms)).await;
        }
    }

    /// Wait for the next step's target element so that step starts on a
    /// loaded page. Returns whether the target showed up.
    async fn preresolve_next(&mut self, idx: usize, steps: &[Step]) -> bool {
        let Some(next) = steps.get(idx + 1) else {
            return false;
        };
        if next.is_structural() {
            return false;
        }

        let surface = self.context.active_surface;
        let timeout = ms(self.config.element_timeout_ms);
        let resolver = ElementResolver::new(&*self.driver);
        let element_name = extract_name(&next.text);

        if let Some((key, selector)) = self
            .cache
            .find_by_prefix(&self.context.current_page_name, &element_name)
        {
            if resolver
                .resolve_within(Some(&selector), surface, timeout)
                .await
                .is_ok()
            {
                debug!("Next target {} ready via cache", key);
                return true;
            }
            debug!("Cached {} not present yet", key);
        }

        let source = waits::wait_for_stable_snapshot(
            &*self.driver,
            ms(self.config.stability_timeout_ms),
            ms(self.config.stability_interval_ms),
        )
        .await
        .into_value();
        let Some(source) = source else {
            return false;
        };

        let reduced = snapshot::reduce(&source, self.config.snapshot_max_chars);
        let commands = match self.translator.translate(&next.text, &reduced).await {
            Ok(response) => response.into_commands(&next.text),
            Err(e) => {
                warn!("Could not translate upcoming step ahead of time: {}", e);
                return false;
            }
        };
        if commands.is_empty() {
            return false;
        }

        let target = commands.iter().find_map(|c| c.selector.clone());
        self.prefetched = Some((idx + 1, commands));

        match target {
            Some(selector) => resolver
                .resolve_within(Some(&selector), surface, timeout)
                .await
                .is_ok(),
            None => false,
        }
    }

    async fn action_step(&mut self, idx: usize, step: &Step) -> Result<()> {
        let step_number = step.ordinal_index;
        self.ensure_surface(self.context.active_surface, step_number)
            .await?;

        let indicators = self.config.loading_locators(self.driver.platform());
        waits::wait_for_loading_indicators(
            &*self.driver,
            &indicators,
            ms(self.config.loading_timeout_ms),
            ms(self.config.stability_interval_ms),
        )
        .await;

        let mut commands = match self.prefetched.take() {
            Some((target, commands)) if target == idx => {
                debug!("Using {} prefetched commands", commands.len());
                commands
            }
            _ => self.translate(&step.text).await?,
        };
        if commands.is_empty() {
            debug!("Translation produced nothing usable, healing from scratch");
            commands.push(Command::placeholder(&step.text));
        }

        {
            let executor =
                SelfHealingExecutor::new(&*self.driver, &*self.translator, &self.config);
            for command in &commands {
                let execution = executor
                    .execute(
                        command,
                        &self.cache,
                        &self.context.current_page_name,
                        self.context.active_surface,
                        &step.text,
                    )
                    .await?;

                match execution.source {
                    SelectorSource::Cache => {
                        self.note(step_number, format!("cached {}", execution.final_selector))
                    }
                    SelectorSource::Healed => {
                        self.note(step_number, format!("healed {}", execution.final_selector))
                    }
                    SelectorSource::Direct => {}
                }
            }
        }

        self.ensure_surface(self.context.active_surface, step_number)
            .await
    }

    async fn translate(&self, text: &str) -> Result<Vec<Command>> {
        let raw = self.driver.page_source().await?;
        let reduced = snapshot::reduce(&raw, self.config.snapshot_max_chars);
        let response = self.translator.translate(text, &reduced).await?;
        Ok(response.into_commands(text))
    }

    /// Make `target` the active surface. A missing embedded surface falls
    /// back to native.
    async fn ensure_surface(&mut self, target: Surface, step_number: usize) -> Result<()> {
        match target {
            Surface::Embedded => {
                let timeout = ms(self.config.context_timeout_ms);
                match self.switcher.switch_to_embedded(&*self.driver, timeout).await {
                    Ok(name) => {
                        if self.context.active_surface != Surface::Embedded {
                            self.note(step_number, format!("switched to {}", name));
                        }
                        self.context.active_surface = Surface::Embedded;
                    }
                    Err(EngineError::ContextNotFound { timeout_ms }) => {
                        warn!(
                            "No embedded surface after {}ms, falling back to native",
                            timeout_ms
                        );
                        self.switcher.switch_to_native(&*self.driver).await?;
                        self.context.active_surface = Surface::Native;
                        self.note(step_number, "embedded surface missing, using native".into());
                    }
                    Err(e) => return Err(e),
                }
            }
            Surface::Native => {
                self.switcher.switch_to_native(&*self.driver).await?;
                self.context.active_surface = Surface::Native;
            }
        }
        Ok(())
    }

    fn note(&self, step_number: usize, message: String) {
        self.emitter.emit(RunEvent::Note {
            step_number,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedTranslator;
    use crate::ai::Action;
    use crate::cache::{CacheKey, SelectorCache};
    use crate::driver::context::NATIVE_CONTEXT;
    use crate::driver::mock::MockDriver;
    use crate::driver::traits::{Locator, Platform};
    use crate::runner::steps::parse_steps;
    use crate::selector::strategy::LocatorStrategy;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        driver: MockDriver,
        translator: ScriptedTranslator,
        cache: AppCache,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = Arc::new(SelectorCache::load(dir.path(), Platform::Android).unwrap());
            Self {
                cache: cache.for_app("com.example"),
                _dir: dir,
                driver: MockDriver::android(),
                translator: ScriptedTranslator::new(),
            }
        }

        async fn run(&self, text: &str) -> (Vec<StepOutcome>, RunSummary, ExecutionContext) {
            self.run_with(text, EngineConfig::immediate()).await
        }

        async fn run_with(
            &self,
            text: &str,
            config: EngineConfig,
        ) -> (Vec<StepOutcome>, RunSummary, ExecutionContext) {
            let mut orchestrator = Orchestrator::new(
                Box::new(self.driver.clone()),
                Arc::new(self.translator.clone()),
                self.cache.clone(),
                config,
            );
            let (tx, mut rx) = mpsc::unbounded_channel();
            let summary = orchestrator.run(&parse_steps(text), &tx).await;
            drop(tx);
            let mut outcomes = Vec::new();
            while let Some(outcome) = rx.recv().await {
                outcomes.push(outcome);
            }
            (outcomes, summary, orchestrator.context().clone())
        }
    }

    fn command(action: Action, selector: &str) -> Command {
        Command {
            action,
            selector: Some(selector.to_string()),
            value: None,
            original_step: String::new(),
        }
    }

    fn terminal(outcomes: &[StepOutcome]) -> Vec<(usize, StepStatus)> {
        outcomes
            .iter()
            .filter(|o| o.status.is_terminal())
            .map(|o| (o.step_number, o.status))
            .collect()
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_failing_step() {
        let h = Harness::new();
        h.driver.add_element(Locator::AccessibilityId("login".into()));
        h.translator
            .on_translate("Tap *Login*", vec![command(Action::Click, "~login")]);
        h.translator
            .on_translate("Tap *Ghost*", vec![command(Action::Click, "~ghost")]);
        h.translator
            .on_translate("Tap *Logout*", vec![command(Action::Click, "~login")]);

        let (outcomes, summary, _) = h
            .run("Launch the app\nTap *Login*\nTap *Ghost*\nTap *Logout*")
            .await;

        assert_eq!(
            terminal(&outcomes),
            vec![
                (1, StepStatus::Passed),
                (2, StepStatus::Passed),
                (3, StepStatus::Failed)
            ]
        );
        assert!(outcomes.iter().all(|o| o.step_number <= 3));
        assert_eq!(
            outcomes.last().unwrap().error_detail.as_deref(),
            Some("Element not found for step: Tap *Ghost*")
        );
        assert_eq!((summary.passed, summary.failed, summary.not_run), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_every_step_reports_running_first() {
        let h = Harness::new();
        let (outcomes, summary, _) = h.run("Launch the app\nWait for the Home page to load").await;
        assert_eq!(
            outcomes,
            vec![
                StepOutcome::running(1),
                StepOutcome::passed(1),
                StepOutcome::running(2),
                StepOutcome::passed(2),
            ]
        );
        assert!(summary.is_success());
    }

    #[tokio::test]
    async fn test_page_label_scopes_cache_lookups() {
        let h = Harness::new();
        h.driver.add_element(Locator::AccessibilityId("loginButton".into()));
        h.cache
            .put(
                &CacheKey::new("login", "Login", LocatorStrategy::AccessibilityId),
                "~loginButton",
            )
            .unwrap();
        let step = "Tap the *Login* button";
        h.translator
            .on_translate(step, vec![command(Action::Click, "~signInButton")]);

        let (outcomes, _, context) = h
            .run("Wait for the Login page to load\nTap the *Login* button")
            .await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(context.current_page_name, "login");
        assert_eq!(h.driver.clicks(), vec![Locator::AccessibilityId("loginButton".into())]);
        assert_eq!(h.translator.suggest_calls(), 0);
        // Target was found through the cache, so no settle pause for the page load
        assert!(h.driver.pauses().iter().all(|p| p.is_zero()));
        assert_eq!(h.driver.pauses().len(), 1);
    }

    #[tokio::test]
    async fn test_page_load_prefetches_next_translation() {
        let h = Harness::new();
        h.driver.add_element(Locator::Id("com.example:id/buy".into()));
        let step = "Tap the *Buy* button";
        h.translator
            .on_translate(step, vec![command(Action::Click, "com.example:id/buy")]);

        let (outcomes, _, _) = h
            .run("Wait for the Product page to load\nTap the *Buy* button")
            .await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(h.translator.translate_calls(), 1);
        assert_eq!(h.driver.clicks(), vec![Locator::Id("com.example:id/buy".into())]);
        assert!(h
            .cache
            .get(&CacheKey::new("product", "Buy", LocatorStrategy::ResourceId))
            .is_some());
    }

    #[tokio::test]
    async fn test_page_load_without_target_never_fails() {
        let h = Harness::new();
        h.translator.fail_on("Tap *Missing*");

        let (outcomes, _, _) = h
            .run("Wait for the Home page to load\nTap *Missing*")
            .await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Failed)]
        );
        assert!(outcomes[3]
            .error_detail
            .as_deref()
            .unwrap()
            .starts_with("Translation failed"));
    }

    #[tokio::test]
    async fn test_empty_translation_falls_back_to_healing() {
        let h = Harness::new();
        h.driver.add_element(Locator::AccessibilityId("banner".into()));
        let step = "Verify the *Banner* is visible";
        h.translator.on_suggest(step, "~banner");

        let (outcomes, _, _) = h.run(step).await;

        assert_eq!(terminal(&outcomes), vec![(1, StepStatus::Passed)]);
        assert_eq!(h.translator.translate_calls(), 1);
        assert_eq!(h.translator.suggest_calls(), 1);
        assert!(h.driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_missing_web_view_falls_back_to_native() {
        let h = Harness::new();
        h.driver.add_element(Locator::AccessibilityId("ok".into()));
        h.translator
            .on_translate("Tap *OK*", vec![command(Action::Click, "~ok")]);

        let (outcomes, _, context) = h.run("Wait for the web view to load\nTap *OK*").await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(context.active_surface, Surface::Native);
        assert_eq!(h.driver.switch_count(), 0);
    }

    #[tokio::test]
    async fn test_embedded_surface_is_kept_across_steps() {
        let h = Harness::new();
        h.driver.add_context("WEBVIEW_com.example");
        h.driver.add_element(Locator::Css("#pay".into()));
        h.translator
            .on_translate("Tap *Pay*", vec![command(Action::Click, "css=#pay")]);

        let (outcomes, _, context) = h.run("Wait for the web view to load\nTap *Pay*").await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(context.active_surface, Surface::Embedded);
        assert_eq!(h.driver.current_context_name(), "WEBVIEW_com.example");
        assert_eq!(h.driver.switch_count(), 1);
        assert_eq!(h.driver.clicks(), vec![Locator::Css("#pay".into())]);
    }

    #[tokio::test]
    async fn test_page_load_before_structural_step_pauses() {
        let h = Harness::new();
        let mut config = EngineConfig::immediate();
        config.page_load_settle_ms = 1500;

        let (outcomes, _, context) = h
            .run_with(
                "Wait for the Home page to load\nWait for the Cart page to load",
                config,
            )
            .await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(context.current_page_name, "cart");
        assert_eq!(
            h.driver.pauses(),
            vec![Duration::from_millis(1500), Duration::from_millis(1500)]
        );
        assert_eq!(h.translator.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_surface_is_reasserted_after_action() {
        let h = Harness::new();
        h.driver.add_context("WEBVIEW_com.example");
        let link = Locator::Css("#terms".into());
        h.driver.add_element(link.clone());
        h.driver.navigate_on_click(link.clone(), NATIVE_CONTEXT);
        h.translator
            .on_translate("Tap *Terms*", vec![command(Action::Click, "css=#terms")]);

        let (outcomes, _, context) = h.run("Wait for the web view to load\nTap *Terms*").await;

        assert_eq!(
            terminal(&outcomes),
            vec![(1, StepStatus::Passed), (2, StepStatus::Passed)]
        );
        assert_eq!(h.driver.clicks(), vec![link]);
        assert_eq!(context.active_surface, Surface::Embedded);
        assert_eq!(h.driver.current_context_name(), "WEBVIEW_com.example");
        assert_eq!(h.driver.switch_count(), 2);
    }

    #[tokio::test]
    async fn test_wrapped_single_translation_is_executed() {
        let h = Harness::new();
        h.driver.add_element(Locator::AccessibilityId("next".into()));
        h.translator.on_translate_json(
            "Tap *Next*",
            r#"{"steps": {"action": "click", "selector": "~next"}}"#,
        );

        let (outcomes, _, _) = h.run("Tap *Next*").await;

        assert_eq!(terminal(&outcomes), vec![(1, StepStatus::Passed)]);
        assert_eq!(h.driver.clicks(), vec![Locator::AccessibilityId("next".into())]);
        assert_eq!(h.translator.suggest_calls(), 0);
    }

    #[tokio::test]
    async fn test_bare_single_translation_is_executed() {
        let h = Harness::new();
        let field = Locator::Id("com.example:id/email".into());
        h.driver.add_element(field.clone());
        let step = "Type bob@example.com into *Email*";
        h.translator.on_translate_json(
            step,
            r#"{"action": "setValue", "selector": "com.example:id/email", "value": "bob@example.com"}"#,
        );

        let (outcomes, _, _) = h.run(step).await;

        assert_eq!(terminal(&outcomes), vec![(1, StepStatus::Passed)]);
        assert_eq!(h.driver.values(), vec![(field, "bob@example.com".to_string())]);
        assert_eq!(h.translator.suggest_calls(), 0);
    }
}
