pub mod ai;
pub mod cache;
pub mod driver;
pub mod error;
pub mod report;
pub mod runner;
pub mod selector;
pub mod utils;

// Re-export common items
pub use cache::{AppCache, CacheKey, SelectorCache};
pub use error::{EngineError, Result};
pub use runner::{run_orchestration, Orchestrator};
