//! Natural-language steps and structural step recognition
//!
//! Launch and page-load steps are handled by the orchestrator itself and
//! never reach the translation backend.

use crate::driver::context::Surface;
use crate::selector::name::marked_span;
use regex::Regex;
use std::sync::LazyLock;

static LAUNCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(re)?launch").unwrap());

/// A wait naming a page, a screen or a web view, or the app loading
static PAGE_LOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwait\b.*\b(page|screen|web ?view|(app|application)\b.*\bload(ed|s|ing)?)\b")
        .unwrap()
});

/// "for the Login page", "until *Checkout* screen"
static PAGE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:for|until)\s+(?:the\s+)?(.+?)\s+(?:page|screen)\b").unwrap()
});

static EMBEDDED_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(web ?view|embedded)\b").unwrap());

static NATIVE_HINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bnative\b").unwrap());

/// One line of a test, numbered from 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub text: String,
    pub ordinal_index: usize,
}

/// How the orchestrator treats a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Settle after the app is launched
    Launch,
    /// Wait for a page, optionally naming it or the surface it lives on
    PageLoad {
        page: Option<String>,
        surface: Option<Surface>,
    },
    /// Anything else: translated and executed
    Action,
}

impl Step {
    pub fn new(text: &str, ordinal_index: usize) -> Self {
        Self {
            text: text.trim().to_string(),
            ordinal_index,
        }
    }

    pub fn kind(&self) -> StepKind {
        if LAUNCH.is_match(&self.text) {
            return StepKind::Launch;
        }
        if PAGE_LOAD.is_match(&self.text) {
            let surface = surface_hint(&self.text);
            return StepKind::PageLoad {
                page: surface.is_none().then(|| page_label(&self.text)).flatten(),
                surface,
            };
        }
        StepKind::Action
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self.kind(), StepKind::Action)
    }
}

/// Split a test body into steps, one per non-blank line
pub fn parse_steps(raw: &str) -> Vec<Step> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(idx, line)| Step::new(line, idx + 1))
        .collect()
}

/// Page name in front of "page"/"screen", markers stripped, lowercased
pub fn page_label(text: &str) -> Option<String> {
    let raw = PAGE_LABEL.captures(text)?.get(1)?.as_str().trim();
    let label = marked_span(raw).unwrap_or_else(|| raw.to_string());
    let label = label.to_lowercase();
    (!label.is_empty()).then_some(label)
}

/// Surface explicitly named by a step
pub fn surface_hint(text: &str) -> Option<Surface> {
    if EMBEDDED_HINT.is_match(text) {
        Some(Surface::Embedded)
    } else if NATIVE_HINT.is_match(text) {
        Some(Surface::Native)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps_skips_blank_lines_only() {
        let steps = parse_steps("Launch the app\n\n  # login flow\n  Tap *Login*  \n\t\nWait for the Home page to load\n");
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[1], Step::new("# login flow", 2));
        assert_eq!(steps[2], Step::new("Tap *Login*", 3));
        assert_eq!(steps[3].ordinal_index, 4);
    }

    #[test]
    fn test_launch_step() {
        assert_eq!(Step::new("Launch the app", 1).kind(), StepKind::Launch);
        assert_eq!(Step::new("relaunch application", 1).kind(), StepKind::Launch);
    }

    #[test]
    fn test_page_load_step_with_label() {
        assert_eq!(
            Step::new("Wait for the Login page to load", 1).kind(),
            StepKind::PageLoad {
                page: Some("login".into()),
                surface: None
            }
        );
        assert_eq!(
            Step::new("Wait for *Checkout Summary* screen", 1).kind(),
            StepKind::PageLoad {
                page: Some("checkout summary".into()),
                surface: None
            }
        );
    }

    #[test]
    fn test_page_load_step_with_surface() {
        assert_eq!(
            Step::new("Wait for the web view to load", 1).kind(),
            StepKind::PageLoad {
                page: None,
                surface: Some(Surface::Embedded)
            }
        );
        assert_eq!(
            Step::new("Wait until the native screen appears", 1).kind(),
            StepKind::PageLoad {
                page: None,
                surface: Some(Surface::Native)
            }
        );
    }

    #[test]
    fn test_page_load_without_label() {
        assert_eq!(
            Step::new("Wait for the app to load", 1).kind(),
            StepKind::PageLoad {
                page: None,
                surface: None
            }
        );
        assert_eq!(
            page_label("Wait for the Home page and the *Banner*").as_deref(),
            Some("home")
        );
    }

    #[test]
    fn test_element_waits_are_actions() {
        for text in [
            "Wait for the *Submit* button to appear",
            "Wait for the *Submit* button to load",
            "Wait until the spinner disappears",
            "Wait for the *Preview* view",
        ] {
            assert_eq!(Step::new(text, 1).kind(), StepKind::Action, "{}", text);
        }
    }

    #[test]
    fn test_action_steps() {
        for text in ["Tap the *Launch* button", "Tap the *Login* button", "Enter \"bob\" into username", "Verify the cart is empty"] {
            assert_eq!(Step::new(text, 1).kind(), StepKind::Action, "{}", text);
        }
    }
}
