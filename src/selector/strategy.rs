//! Locator classification
//!
//! Maps a selector string onto the locator syntax family it belongs to. The
//! result feeds both cache keys and the resolver's dispatch, so it must only
//! look at surface syntax and never at the live UI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used by platform resource ids (`com.example:id/login`)
pub const RESOURCE_ID_SEPARATOR: &str = ":id/";

/// Locator syntax family of a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorStrategy {
    ResourceId,
    AccessibilityId,
    Xpath,
    Css,
    Unknown,
}

impl LocatorStrategy {
    /// Tag used inside cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorStrategy::ResourceId => "resource-id",
            LocatorStrategy::AccessibilityId => "accessibility-id",
            LocatorStrategy::Xpath => "xpath",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Unknown => "unknown",
        }
    }

    /// Parse a cache-key tag back into a strategy
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "resource-id" => Some(LocatorStrategy::ResourceId),
            "accessibility-id" => Some(LocatorStrategy::AccessibilityId),
            "xpath" => Some(LocatorStrategy::Xpath),
            "css" => Some(LocatorStrategy::Css),
            "unknown" => Some(LocatorStrategy::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a selector by its surface syntax.
///
/// Total and pure: `None` and empty strings are `Unknown`. XPath is checked
/// before the resource-id separator so that expressions such as
/// `//*[@resource-id='pkg:id/name']` stay XPath.
pub fn classify(selector: Option<&str>) -> LocatorStrategy {
    let s = match selector.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return LocatorStrategy::Unknown,
    };

    if s.starts_with('~') {
        LocatorStrategy::AccessibilityId
    } else if s.starts_with("css=") {
        LocatorStrategy::Css
    } else if s.starts_with("//") || s.starts_with('(') {
        LocatorStrategy::Xpath
    } else if s.contains(RESOURCE_ID_SEPARATOR)
        || s.starts_with("resource-id:")
        || s.starts_with("resource-id=")
    {
        LocatorStrategy::ResourceId
    } else {
        LocatorStrategy::Unknown
    }
}
