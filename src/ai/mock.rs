//! Scripted translator for engine tests

use super::{Command, TranslationResponse, Translator};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    translations: HashMap<String, Vec<Command>>,
    payloads: HashMap<String, String>,
    suggestions: HashMap<String, String>,
    failing: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedTranslator {
    script: Arc<Mutex<Script>>,
    translate_calls: Arc<AtomicUsize>,
    suggest_calls: Arc<AtomicUsize>,
}

impl ScriptedTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_translate(&self, step: &str, commands: Vec<Command>) {
        self.script
            .lock()
            .unwrap()
            .translations
            .insert(step.to_string(), commands);
    }

    /// Answer `step` with a raw backend payload in any response shape
    pub fn on_translate_json(&self, step: &str, payload: &str) {
        self.script
            .lock()
            .unwrap()
            .payloads
            .insert(step.to_string(), payload.to_string());
    }

    pub fn on_suggest(&self, step: &str, selector: &str) {
        self.script
            .lock()
            .unwrap()
            .suggestions
            .insert(step.to_string(), selector.to_string());
    }

    /// Make both calls fail for `step`
    pub fn fail_on(&self, step: &str) {
        self.script.lock().unwrap().failing.push(step.to_string());
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn suggest_calls(&self) -> usize {
        self.suggest_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, step: &str, _snapshot: &str) -> Result<TranslationResponse> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        if script.failing.iter().any(|s| s == step) {
            return Err(EngineError::Translation(format!("backend down for '{}'", step)));
        }
        if let Some(payload) = script.payloads.get(step) {
            return Ok(TranslationResponse::from_json(payload));
        }
        Ok(TranslationResponse::List(
            script.translations.get(step).cloned().unwrap_or_default(),
        ))
    }

    async fn suggest_selector(&self, step: &str, _snapshot: &str) -> Result<String> {
        self.suggest_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        if script.failing.iter().any(|s| s == step) {
            return Err(EngineError::Translation(format!("backend down for '{}'", step)));
        }
        Ok(script.suggestions.get(step).cloned().unwrap_or_default())
    }
}
