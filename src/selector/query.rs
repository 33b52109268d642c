//! Selector dispatch
//!
//! A selector string is classified once into a [`SelectorForm`] and then
//! turned into a platform-native [`Locator`]. Rule order matters: structured,
//! unambiguous forms are matched before anything is treated as free text.

use crate::driver::context::Surface;
use crate::driver::traits::{Locator, Platform};
use crate::selector::strategy::RESOURCE_ID_SEPARATOR;
use regex::Regex;
use std::sync::LazyLock;

/// Human-readable attributes searched by the free-text fallback
const FREE_TEXT_ATTRIBUTES: [&str; 4] = ["text", "content-desc", "name", "label"];

/// Unquoted or single-quoted string arguments inside a UiSelector builder
static UNQUOTED_BUILDER_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\.(text|textContains|textStartsWith|textMatches|description|descriptionContains|descriptionStartsWith|descriptionMatches|resourceId|resourceIdMatches|className|classNameMatches)\(\s*([^")\s][^)]*?)\s*\)"#,
    )
    .unwrap()
});

/// Parsed shape of a selector string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorForm {
    /// Anything on the embedded web surface
    Web(String),
    /// `css=` prefix
    Css(String),
    /// `resource-id:` / `resource-id=` prefix or a `pkg:id/name` string
    ResourceId(String),
    /// `new UiSelector()...` builder literal
    UiSelector(String),
    /// `name=` prefix
    Name(String),
    /// `label=` prefix
    Label(String),
    /// `~` prefix
    AccessibilityId(String),
    /// Raw XPath expression
    XPath(String),
    /// Last resort: case-insensitive contains over readable attributes
    FreeText(String),
}

impl SelectorForm {
    /// Classify a selector for the given surface. Empty selectors yield `None`.
    pub fn parse(selector: &str, surface: Surface) -> Option<Self> {
        let s = selector.trim();
        if s.is_empty() {
            return None;
        }

        if surface == Surface::Embedded {
            return Some(SelectorForm::Web(s.to_string()));
        }

        let form = if let Some(rest) = s.strip_prefix("css=") {
            SelectorForm::Css(rest.trim().to_string())
        } else if let Some(rest) = s
            .strip_prefix("resource-id:")
            .or_else(|| s.strip_prefix("resource-id="))
        {
            SelectorForm::ResourceId(unquote(rest).to_string())
        } else if s.starts_with("new UiSelector()") || s.starts_with("UiSelector()") {
            SelectorForm::UiSelector(sanitize_ui_selector(s))
        } else if let Some(rest) = s.strip_prefix("name=") {
            SelectorForm::Name(unquote(rest).to_string())
        } else if let Some(rest) = s.strip_prefix("label=") {
            SelectorForm::Label(unquote(rest).to_string())
        } else if let Some(rest) = s.strip_prefix('~') {
            SelectorForm::AccessibilityId(rest.trim().to_string())
        } else if s.starts_with("//") || s.starts_with('(') {
            SelectorForm::XPath(s.to_string())
        } else if s.contains(RESOURCE_ID_SEPARATOR) {
            SelectorForm::ResourceId(s.to_string())
        } else {
            SelectorForm::FreeText(unquote(s).to_string())
        };

        Some(form)
    }

    /// Build the platform-native query for this form
    pub fn to_locator(&self, platform: Platform) -> Locator {
        match self {
            SelectorForm::Web(s) => web_locator(s),
            SelectorForm::Css(s) => Locator::Css(s.clone()),
            SelectorForm::ResourceId(id) => Locator::Id(id.clone()),
            SelectorForm::UiSelector(expr) => Locator::AndroidUiAutomator(expr.clone()),
            SelectorForm::Name(name) => Locator::AccessibilityId(name.clone()),
            SelectorForm::Label(label) => match platform {
                Platform::Ios => Locator::IosPredicate(format!(
                    "label == \"{}\"",
                    label.replace('"', "\\\"")
                )),
                Platform::Android => {
                    Locator::XPath(format!("//*[@text={}]", xpath_literal(label)))
                }
            },
            SelectorForm::AccessibilityId(id) => Locator::AccessibilityId(id.clone()),
            SelectorForm::XPath(xpath) => Locator::XPath(xpath.clone()),
            SelectorForm::FreeText(text) => Locator::XPath(contains_xpath(text)),
        }
    }
}

/// Selectors on the embedded surface pass through as CSS or XPath
fn web_locator(s: &str) -> Locator {
    if let Some(rest) = s.strip_prefix("css=") {
        Locator::Css(rest.trim().to_string())
    } else if s.starts_with("//") || s.starts_with('(') {
        Locator::XPath(s.to_string())
    } else {
        Locator::Css(s.to_string())
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Quote bare string arguments: `.text(Login)` -> `.text("Login")`
pub fn sanitize_ui_selector(expr: &str) -> String {
    let expr = if expr.starts_with("UiSelector()") {
        format!("new {}", expr)
    } else {
        expr.to_string()
    };

    UNQUOTED_BUILDER_ARG
        .replace_all(&expr, |caps: &regex::Captures| {
            let arg = unquote(&caps[2]).replace('"', "\\\"");
            format!(".{}(\"{}\")", &caps[1], arg)
        })
        .to_string()
}

/// Encode a string as an XPath 1.0 literal
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Case-insensitive contains over the readable attributes
pub fn contains_xpath(text: &str) -> String {
    const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

    let needle = xpath_literal(&text.to_lowercase());
    let clauses: Vec<String> = FREE_TEXT_ATTRIBUTES
        .iter()
        .map(|attr| {
            format!(
                "contains(translate(@{}, '{}', '{}'), {})",
                attr, UPPER, LOWER, needle
            )
        })
        .collect();

    format!("//*[{}]", clauses.join(" or "))
}
