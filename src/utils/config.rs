use crate::driver::context::Surface;
use crate::driver::traits::{Locator, Platform};
use crate::error::{EngineError, Result};
use crate::selector::query::SelectorForm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Existence wait for a command's own selector (ms)
    pub element_timeout_ms: u64,

    /// Existence wait for a cached selector (ms)
    pub cache_timeout_ms: u64,

    /// Existence wait for a healed selector (ms)
    pub heal_timeout_ms: u64,

    /// How long to look for an embedded web surface (ms)
    pub context_timeout_ms: u64,

    /// Interval between surface listings (ms)
    pub context_poll_interval_ms: u64,

    /// Settle delay after every UI action (ms)
    pub action_settle_ms: u64,

    /// Settle delay for launch steps (ms)
    pub launch_settle_ms: u64,

    /// Fallback pause for page-load steps (ms)
    pub page_load_settle_ms: u64,

    /// Upper bound for waiting on an unchanging page snapshot (ms)
    pub stability_timeout_ms: u64,

    /// Interval between snapshot comparisons (ms)
    pub stability_interval_ms: u64,

    /// Upper bound for loading indicators to disappear (ms)
    pub loading_timeout_ms: u64,

    /// Selectors treated as loading indicators. Empty means platform defaults.
    pub loading_indicators: Vec<String>,

    /// Character limit for reduced snapshots
    pub snapshot_max_chars: usize,

    /// Directory holding the per-platform selector cache files
    pub cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            element_timeout_ms: 5000,
            cache_timeout_ms: 3000,
            heal_timeout_ms: 5000,
            context_timeout_ms: 10000,
            context_poll_interval_ms: 500,
            action_settle_ms: 1000,
            launch_settle_ms: 3000,
            page_load_settle_ms: 2000,
            stability_timeout_ms: 8000,
            stability_interval_ms: 500,
            loading_timeout_ms: 5000,
            loading_indicators: Vec::new(),
            snapshot_max_chars: crate::ai::snapshot::DEFAULT_MAX_CHARS,
            cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Cache directory, defaulting to `~/.lumi-healer/cache`
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".lumi-healer")
                .join("cache")
        })
    }

    /// Loading indicator queries for a platform
    pub fn loading_locators(&self, platform: Platform) -> Vec<Locator> {
        if !self.loading_indicators.is_empty() {
            return self
                .loading_indicators
                .iter()
                .filter_map(|s| SelectorForm::parse(s, Surface::Native))
                .map(|form| form.to_locator(platform))
                .collect();
        }
        match platform {
            Platform::Android => vec![Locator::XPath(
                "//android.widget.ProgressBar".to_string(),
            )],
            Platform::Ios => vec![Locator::XPath(
                "//XCUIElementTypeActivityIndicator".to_string(),
            )],
        }
    }

    /// Config with every delay and timeout zeroed, for tests
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            element_timeout_ms: 0,
            cache_timeout_ms: 0,
            heal_timeout_ms: 0,
            context_timeout_ms: 0,
            context_poll_interval_ms: 1,
            action_settle_ms: 0,
            launch_settle_ms: 0,
            page_load_settle_ms: 0,
            stability_timeout_ms: 0,
            stability_interval_ms: 1,
            loading_timeout_ms: 0,
            ..Self::default()
        }
    }
}

/// Millisecond field helpers
pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.element_timeout_ms, 5000);
        assert_eq!(config.context_timeout_ms, 10000);
        assert!(config.cache_dir().ends_with(".lumi-healer/cache"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("elementTimeoutMs: 1500\ncacheDir: /tmp/pom\n").unwrap();
        assert_eq!(config.element_timeout_ms, 1500);
        assert_eq!(config.heal_timeout_ms, 5000);
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/pom"));
    }

    #[test]
    fn test_loading_locators() {
        let mut config = EngineConfig::default();
        assert_eq!(
            config.loading_locators(Platform::Ios),
            vec![Locator::XPath("//XCUIElementTypeActivityIndicator".into())]
        );
        config.loading_indicators = vec!["com.app:id/spinner".into(), "".into()];
        assert_eq!(
            config.loading_locators(Platform::Android),
            vec![Locator::Id("com.app:id/spinner".into())]
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/lumi.yaml"))).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
