//! Natural-language translation collaborator
//!
//! The engine treats translation as a black box: a step plus a reduced page
//! snapshot go in, structured commands come out. Healing uses the same
//! backend to suggest a replacement selector for a step.

pub mod llm;
#[cfg(test)]
pub mod mock;
pub mod snapshot;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action a command performs on its target element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Click,
    SetValue,
    VerifyVisible,
    LaunchApp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Click => "click",
            Action::SetValue => "setValue",
            Action::VerifyVisible => "verifyVisible",
            Action::LaunchApp => "launchApp",
        };
        f.write_str(name)
    }
}

/// Structured UI action produced by translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub action: Action,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub original_step: String,
}

impl Command {
    /// Stand-in used when translation yields nothing usable. Its missing
    /// selector sends the executor straight into healing.
    pub fn placeholder(step: &str) -> Self {
        Self {
            action: Action::VerifyVisible,
            selector: None,
            value: None,
            original_step: step.to_string(),
        }
    }
}

/// One command or many
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<Command>),
    One(Box<Command>),
}

/// Every response shape the translation backend is known to produce
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TranslationResponse {
    /// `{"steps": [...]}` or `{"steps": {...}}`
    Wrapped { steps: OneOrMany },
    /// `[...]`
    List(Vec<Command>),
    /// `{...}`
    Single(Box<Command>),
}

impl TranslationResponse {
    /// Flatten any shape into an ordered command list, filling in the
    /// originating step where the backend left it out.
    pub fn into_commands(self, step: &str) -> Vec<Command> {
        let commands = match self {
            TranslationResponse::Wrapped {
                steps: OneOrMany::Many(list),
            }
            | TranslationResponse::List(list) => list,
            TranslationResponse::Wrapped {
                steps: OneOrMany::One(cmd),
            }
            | TranslationResponse::Single(cmd) => vec![*cmd],
        };

        commands
            .into_iter()
            .map(|mut cmd| {
                if cmd.original_step.trim().is_empty() {
                    cmd.original_step = step.to_string();
                }
                cmd
            })
            .collect()
    }

    /// Parse a backend payload. Content matching none of the shapes
    /// normalizes to an empty response.
    pub fn from_json(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|e| {
            log::warn!("Unrecognized translation payload: {}", e);
            TranslationResponse::List(Vec::new())
        })
    }
}

/// Translation and healing backend
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate one step into commands against the given snapshot
    async fn translate(&self, step: &str, snapshot: &str) -> Result<TranslationResponse>;

    /// Suggest a selector for the element a step refers to
    async fn suggest_selector(&self, step: &str, snapshot: &str) -> Result<String>;
}

/// Strip stray quoting and code fences from a suggested selector
pub fn sanitize_selector(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(inner) = s.strip_prefix("```") {
        s = inner
            .split_once('\n')
            .map(|(_, body)| body)
            .unwrap_or(inner);
        s = s.trim_end().trim_end_matches("```");
    }
    let first_line = s.trim().lines().next().unwrap_or_default();
    first_line
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}
