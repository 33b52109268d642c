use super::state::{RunSummary, StepOutcome, StepStatus};
use tokio::sync::broadcast;

/// Run events for real-time progress output
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        app_id: String,
        total_steps: usize,
    },
    StepStarted {
        step_number: usize,
        text: String,
    },
    StepFinished {
        outcome: StepOutcome,
        duration_ms: u64,
    },
    /// Cache hit, heal or surface change inside a step
    Note {
        step_number: usize,
        message: String,
    },
    RunFinished {
        summary: RunSummary,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing run progress
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let interactive = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;
        let mut current_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Console listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::RunStarted {
                    run_id,
                    app_id,
                    total_steps,
                } => {
                    println!(
                        "\n{} Run {} for {} ({} steps)",
                        "▶".green().bold(),
                        run_id.cyan(),
                        app_id.white().bold(),
                        total_steps
                    );
                }

                RunEvent::StepStarted { step_number, text } => {
                    let pb = if interactive {
                        ProgressBar::new_spinner()
                    } else {
                        ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
                    };
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("  {spinner:.cyan} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    pb.set_message(format!("{}. {}", step_number, text));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    current_text = text;
                    spinner = Some(pb);
                }

                RunEvent::Note {
                    step_number,
                    message,
                } => {
                    let line = format!("      {} {}", "↳".dimmed(), message.dimmed());
                    match spinner {
                        Some(ref pb) => pb.println(line),
                        None => println!("{} (step {})", line, step_number),
                    }
                }

                RunEvent::StepFinished {
                    outcome,
                    duration_ms,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    match outcome.status {
                        StepStatus::Passed => println!(
                            "  {} {}. {} {}",
                            "✓".green(),
                            outcome.step_number,
                            current_text,
                            format!("({}ms)", duration_ms).dimmed()
                        ),
                        StepStatus::Failed => {
                            println!(
                                "  {} {}. {} {}",
                                "✗".red(),
                                outcome.step_number,
                                current_text.red(),
                                format!("({}ms)", duration_ms).dimmed()
                            );
                            if let Some(error) = outcome.error_detail {
                                println!("      {}", error.red());
                            }
                        }
                        StepStatus::Running => {}
                    }
                }

                RunEvent::RunFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Run finished", "■".blue().bold());
                    println!(
                        "  {} passed, {} failed, {} not run",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.not_run.to_string().yellow()
                    );
                    println!("  Duration: {}ms", summary.duration_ms);
                    break;
                }
            }
        }
    }
}
