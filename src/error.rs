use thiserror::Error;

/// Errors raised by the selector engine.
///
/// `Resolution` and `ContextNotFound` are recovered locally by the executor
/// and the context switcher. `ElementNotFound` is terminal for a step.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No element matched selector '{selector}'")]
    Resolution { selector: String },

    #[error("Embedded web surface did not appear within {timeout_ms}ms")]
    ContextNotFound { timeout_ms: u64 },

    #[error("Element not found for step: {step}")]
    ElementNotFound { step: String },

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("Selector cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl EngineError {
    pub fn resolution(selector: impl Into<String>) -> Self {
        EngineError::Resolution {
            selector: selector.into(),
        }
    }

    pub fn element_not_found(step: impl Into<String>) -> Self {
        EngineError::ElementNotFound { step: step.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
