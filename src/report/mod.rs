pub mod json;
pub mod types;

pub use types::{RunReport, StepReport};
