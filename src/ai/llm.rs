//! OpenAI-compatible chat client used as the translation backend
//!
//! Works against any server exposing `/v1/chat/completions`.

use super::{sanitize_selector, TranslationResponse, Translator};
use crate::error::{EngineError, Result as EngineResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Fenced ```json ... ``` block in a model reply
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap());

const TRANSLATE_PROMPT: &str = r#"You convert one natural-language mobile test step into UI commands.
Reply with JSON only: either a single command object or {"steps": [command, ...]}.
A command is {"action": "click" | "setValue" | "verifyVisible" | "launchApp", "selector": string | null, "value": string | null}.
Prefer selectors in this order: "~accessibilityId", resource ids like "com.app:id/name", XPath.
Use only elements present in the page snapshot."#;

const HEAL_PROMPT: &str = r#"A selector for a mobile test step stopped matching.
Given the step and the current page snapshot, reply with exactly one selector for the element the step refers to and nothing else.
Use "~accessibilityId", a resource id like "com.app:id/name", or an XPath expression."#;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Translator backed by a chat-completions endpoint
#[derive(Debug, Clone)]
pub struct LlmTranslator {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmTranslator {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
        })
    }

    /// Send one system + user exchange and return the reply text
    async fn complete(&self, system: &str, user: String) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .context("Failed to reach translation backend")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Translation backend returned {}: {}", status.as_u16(), body);
        }

        let response: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat completion returned no choices"))
    }
}

/// Pull the JSON payload out of a model reply
pub fn extract_json(reply: &str) -> &str {
    FENCED_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or_else(|| reply.trim())
}

fn step_message(step: &str, snapshot: &str) -> String {
    format!("Step: {}\n\nPage snapshot:\n{}", step, snapshot)
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, step: &str, snapshot: &str) -> EngineResult<TranslationResponse> {
        let reply = self
            .complete(TRANSLATE_PROMPT, step_message(step, snapshot))
            .await
            .map_err(|e| EngineError::Translation(format!("{:#}", e)))?;
        Ok(TranslationResponse::from_json(extract_json(&reply)))
    }

    async fn suggest_selector(&self, step: &str, snapshot: &str) -> EngineResult<String> {
        let reply = self
            .complete(HEAL_PROMPT, step_message(step, snapshot))
            .await
            .map_err(|e| EngineError::Translation(format!("{:#}", e)))?;
        Ok(sanitize_selector(&reply))
    }
}
