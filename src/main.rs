use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

use lumi_healer::ai::llm::LlmTranslator;
use lumi_healer::driver::appium::{self, AppiumClient, DEFAULT_APPIUM_URL};
use lumi_healer::driver::Platform;
use lumi_healer::report::{self, RunReport};
use lumi_healer::runner::{self, ConsoleEventListener, Orchestrator, StepOutcome};
use lumi_healer::utils::config::EngineConfig;
use lumi_healer::SelectorCache;

#[derive(Parser)]
#[command(name = "lumi-healer")]
#[command(author = "NL Team")]
#[command(version = "0.1.0")]
#[command(about = "Self-healing natural-language mobile UI tests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test file, one natural-language step per line
    Run {
        /// Path to the steps file
        path: PathBuf,

        /// Application id (Android package or iOS bundle id)
        #[arg(short, long)]
        app_id: String,

        /// Target platform (android, ios)
        #[arg(short, long, default_value = "android")]
        platform: Platform,

        /// Appium server URL
        #[arg(long, default_value = DEFAULT_APPIUM_URL)]
        appium_url: String,

        /// Attach to an existing session instead of creating one
        #[arg(long)]
        session_id: Option<String>,

        /// JSON file with extra session capabilities
        #[arg(long)]
        caps: Option<PathBuf>,

        /// Base URL of the OpenAI-compatible translation backend
        #[arg(long, default_value = "https://api.openai.com")]
        llm_url: String,

        /// Model used for translation and healing
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        /// Environment variable holding the backend API key
        #[arg(long, default_value = "OPENAI_API_KEY")]
        api_key_env: String,

        /// Engine config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inspect or edit the selector cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print cached selectors
    Show {
        /// Platform whose cache file to read
        #[arg(short, long, default_value = "android")]
        platform: Platform,

        /// Only this application
        #[arg(short, long)]
        app_id: Option<String>,

        /// Engine config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Remove every cached selector of an application
    Clear {
        #[arg(short, long, default_value = "android")]
        platform: Platform,

        #[arg(short, long)]
        app_id: String,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            path,
            app_id,
            platform,
            appium_url,
            session_id,
            caps,
            llm_url,
            model,
            api_key_env,
            config,
            report: report_path,
        } => {
            let config = EngineConfig::load(config.as_deref())?;
            let steps_text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            println!(
                "{} Running steps from: {}",
                "▶".green().bold(),
                path.display()
            );
            println!("  App: {}", app_id.cyan());
            println!("  Platform: {}", platform.to_string().cyan());

            let cache = Arc::new(SelectorCache::load(&config.cache_dir(), platform)?);
            println!("  Cache: {}", cache.path().display().to_string().cyan());

            let translator = LlmTranslator::new(&llm_url, &model, std::env::var(&api_key_env).ok())?;

            let (driver, owned_session) = match session_id {
                Some(id) => (AppiumClient::attach(&appium_url, platform, &id)?, None),
                None => {
                    let mut capabilities = appium::default_capabilities(platform, &app_id);
                    if let Some(caps_path) = caps {
                        let extra = std::fs::read_to_string(&caps_path)
                            .with_context(|| format!("Failed to read {}", caps_path.display()))?;
                        let extra: serde_json::Value = serde_json::from_str(&extra)
                            .with_context(|| format!("Invalid JSON in {}", caps_path.display()))?;
                        capabilities = appium::merge_capabilities(capabilities, extra);
                    }
                    let client = AppiumClient::connect(&appium_url, platform, capabilities).await?;
                    let id = client.session_id().to_string();
                    (client, Some(id))
                }
            };

            let orchestrator = Orchestrator::new(
                Box::new(driver),
                Arc::new(translator),
                cache.for_app(&app_id),
                config,
            );

            let listener = tokio::spawn(ConsoleEventListener::listen(orchestrator.subscribe()));
            let run = runner::run_orchestration(orchestrator, &steps_text);
            let outcomes: Vec<StepOutcome> = run.outcomes.collect().await;
            let summary = run.summary.await;
            let _ = listener.await;

            // The orchestrator owns the driver, so close through a fresh handle
            if let Some(id) = owned_session {
                close_session(&appium_url, platform, &id).await;
            }
            let summary = summary.context("Run task failed")?;

            if let Some(report_path) = report_path {
                let steps = runner::parse_steps(&steps_text);
                let run_report =
                    RunReport::new(&app_id, platform.as_str(), &steps, &outcomes, summary.clone());
                report::json::generate(&run_report, Some(&report_path))?;
            }

            if !summary.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Cache { command } => match command {
            CacheCommands::Show {
                platform,
                app_id,
                config,
            } => {
                let config = EngineConfig::load(config.as_deref())?;
                let cache = SelectorCache::load(&config.cache_dir(), platform)?;
                let entries = cache.entries(app_id.as_deref());

                println!(
                    "{} {} ({} entries)",
                    "📦".to_string().blue(),
                    cache.path().display(),
                    entries.len()
                );
                let mut current_app: Option<&str> = None;
                for (app, key, selector) in &entries {
                    if current_app != Some(app.as_str()) {
                        println!("\n  {}", app.white().bold());
                        current_app = Some(app.as_str());
                    }
                    println!("    {} {} {}", key.cyan(), "→".dimmed(), selector);
                }
            }

            CacheCommands::Clear {
                platform,
                app_id,
                config,
            } => {
                let config = EngineConfig::load(config.as_deref())?;
                let cache = SelectorCache::load(&config.cache_dir(), platform)?;
                let removed = cache.clear_app(&app_id)?;
                println!(
                    "{} Removed {} cached selectors for {}",
                    "✓".green(),
                    removed,
                    app_id.cyan()
                );
            }
        },
    }

    Ok(())
}

async fn close_session(appium_url: &str, platform: Platform, id: &str) {
    let result = match AppiumClient::attach(appium_url, platform, id) {
        Ok(session) => session.close().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::warn!("Failed to close session {}: {:#}", id, e);
    }
}
