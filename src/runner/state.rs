use crate::driver::context::Surface;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Page name used before any page-load step names one
pub const INITIAL_PAGE: &str = "initial";

/// Mutable orchestration state for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub current_page_name: String,
    pub active_surface: Surface,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            current_page_name: INITIAL_PAGE.to_string(),
            active_surface: Surface::Native,
        }
    }
}

/// Step execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Passed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Passed | StepStatus::Failed)
    }
}

/// Observational record emitted as a step progresses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_number: usize,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl StepOutcome {
    pub fn running(step_number: usize) -> Self {
        Self {
            step_number,
            status: StepStatus::Running,
            error_detail: None,
        }
    }

    pub fn passed(step_number: usize) -> Self {
        Self {
            step_number,
            status: StepStatus::Passed,
            error_detail: None,
        }
    }

    pub fn failed(step_number: usize, error: String) -> Self {
        Self {
            step_number,
            status: StepStatus::Failed,
            error_detail: Some(error),
        }
    }
}

/// Totals for a finished run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    /// Steps never started because an earlier one failed
    pub not_run: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_run == 0
    }
}

/// Accumulates terminal outcomes into a summary
#[derive(Debug)]
pub struct RunTally {
    run_id: String,
    total_steps: usize,
    passed: usize,
    failed: usize,
    started_at: Instant,
}

impl RunTally {
    pub fn new(run_id: &str, total_steps: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            total_steps,
            passed: 0,
            failed: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &StepOutcome) {
        match outcome.status {
            StepStatus::Passed => self.passed += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Running => {}
        }
    }

    pub fn finish(self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            total_steps: self.total_steps,
            passed: self.passed,
            failed: self.failed,
            not_run: self.total_steps - self.passed - self.failed,
            duration_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.current_page_name, "initial");
        assert_eq!(ctx.active_surface, Surface::Native);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&StepOutcome::failed(3, "boom".into())).unwrap();
        assert_eq!(json, r#"{"stepNumber":3,"status":"failed","errorDetail":"boom"}"#);
        let json = serde_json::to_string(&StepOutcome::running(1)).unwrap();
        assert_eq!(json, r#"{"stepNumber":1,"status":"running"}"#);
    }

    #[test]
    fn test_tally_counts_unrun_steps() {
        let mut tally = RunTally::new("run", 5);
        tally.record(&StepOutcome::running(1));
        tally.record(&StepOutcome::passed(1));
        tally.record(&StepOutcome::passed(2));
        tally.record(&StepOutcome::failed(3, "x".into()));
        let summary = tally.finish();
        assert_eq!((summary.passed, summary.failed, summary.not_run), (2, 1, 2));
        assert!(!summary.is_success());
    }
}
