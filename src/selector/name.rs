use regex::Regex;
use std::sync::LazyLock;

/// Marker-delimited span: `*Login*`, `"Login"` or `` `Login` ``
static MARKED_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\*([^*]+)\*|"([^"]+)"|`([^`]+)`"#).unwrap());

/// Find the interior of the first marker-delimited span, trimmed.
pub fn marked_span(text: &str) -> Option<String> {
    MARKED_SPAN
        .captures_iter(text)
        .filter_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().trim().to_string())
        })
        .find(|s| !s.is_empty())
}

/// Derive the canonical element name a step talks about.
///
/// Heuristic: the first marked span if there is one, otherwise the last
/// whitespace-delimited token. Never fails; empty input yields an empty name.
pub fn extract_name(step_text: &str) -> String {
    if let Some(span) = marked_span(step_text) {
        return span;
    }
    step_text
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string()
}
