use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Target mobile platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            _ => anyhow::bail!("Unknown platform: {}", s),
        }
    }
}

/// A platform-native query understood by the automation session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Accessibility id (content-desc on Android, name on iOS)
    AccessibilityId(String),
    /// Resource id / element id
    Id(String),
    /// XPath expression against the current UI tree
    XPath(String),
    /// CSS selector (embedded web surface only)
    Css(String),
    /// Android `new UiSelector()` builder expression
    AndroidUiAutomator(String),
    /// iOS NSPredicate string
    IosPredicate(String),
}

impl Locator {
    /// W3C `using` strategy name
    pub fn using(&self) -> &'static str {
        match self {
            Locator::AccessibilityId(_) => "accessibility id",
            Locator::Id(_) => "id",
            Locator::XPath(_) => "xpath",
            Locator::Css(_) => "css selector",
            Locator::AndroidUiAutomator(_) => "-android uiautomator",
            Locator::IosPredicate(_) => "-ios predicate string",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::AccessibilityId(v)
            | Locator::Id(v)
            | Locator::XPath(v)
            | Locator::Css(v)
            | Locator::AndroidUiAutomator(v)
            | Locator::IosPredicate(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.using(), self.value())
    }
}

/// Reference to a live element inside the automation session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// Session-scoped element reference returned by the driver
    pub element_id: String,
    /// The query that produced this element
    pub locator: Locator,
}

/// Session-scoped automation driver protocol
///
/// The engine only depends on this trait. `AppiumClient` implements it over
/// the W3C WebDriver wire protocol; tests use a scripted driver.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Platform of the device behind this session
    fn platform(&self) -> Platform;

    /// Query a single element. `Ok(None)` means the query matched nothing.
    async fn find_element(&self, locator: &Locator) -> Result<Option<ElementHandle>>;

    /// Wait until `locator` matches an element, bounded by `timeout`.
    async fn wait_for_exist(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;

    /// Check whether an element is currently displayed
    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool>;

    /// Click / tap an element
    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Replace the value of an input element
    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<()>;

    /// List available UI surfaces (e.g. `NATIVE_APP`, `WEBVIEW_com.example`)
    async fn contexts(&self) -> Result<Vec<String>>;

    /// Name of the active UI surface
    async fn current_context(&self) -> Result<String>;

    /// Switch the active UI surface
    async fn switch_context(&self, name: &str) -> Result<()>;

    /// Raw structural dump of the current UI tree
    async fn page_source(&self) -> Result<String>;

    /// Suspend the run for a fixed delay
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
