pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod state;
pub mod steps;
pub mod waits;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use events::*;
pub use orchestrator::Orchestrator;
pub use state::*;
pub use steps::{parse_steps, Step, StepKind};

/// A run in progress
pub struct OrchestrationRun {
    /// Every outcome in emission order; ends when the run does
    pub outcomes: BoxStream<'static, StepOutcome>,
    /// Resolves to the run summary once the last outcome has been sent
    pub summary: JoinHandle<RunSummary>,
}

/// Start running `steps_text` on a background task.
///
/// The orchestrator carries the session, the translation backend and the
/// application's cache view.
pub fn run_orchestration(mut orchestrator: Orchestrator, steps_text: &str) -> OrchestrationRun {
    let steps = parse_steps(steps_text);
    let (tx, rx) = mpsc::unbounded_channel();

    let summary = tokio::spawn(async move { orchestrator.run(&steps, &tx).await });

    let outcomes = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|outcome| (outcome, rx))
    })
    .boxed();

    OrchestrationRun { outcomes, summary }
}
