use crate::runner::state::{RunSummary, StepOutcome, StepStatus};
use crate::runner::steps::Step;
use serde::{Deserialize, Serialize};

/// Final record of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_number: usize,
    pub text: String,
    /// `None` for steps that never ran
    pub status: Option<StepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Run results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub app_id: String,
    pub platform: String,
    pub steps: Vec<StepReport>,
    pub summary: RunSummary,
    pub generated_at: String,
}

impl RunReport {
    /// Pair each step with the last outcome seen for it
    pub fn new(
        app_id: &str,
        platform: &str,
        steps: &[Step],
        outcomes: &[StepOutcome],
        summary: RunSummary,
    ) -> Self {
        let steps = steps
            .iter()
            .map(|step| {
                let last = outcomes
                    .iter()
                    .rev()
                    .find(|o| o.step_number == step.ordinal_index);
                StepReport {
                    step_number: step.ordinal_index,
                    text: step.text.clone(),
                    status: last.map(|o| o.status),
                    error_detail: last.and_then(|o| o.error_detail.clone()),
                }
            })
            .collect();

        Self {
            run_id: summary.run_id.clone(),
            app_id: app_id.to_string(),
            platform: platform.to_string(),
            steps,
            summary,
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}
