//! `shellpilot` - drive a shell toward a goal with an LLM
//!
//! Proposes commands for a plain-language goal, runs them in a local bash,
//! reads the output and asks for fixes until the goal is met or cannot be.

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{Cli, Commands};
use crate::terminal::{PtyChannel, TerminalApprover};
use shellpilot_core::config::{get_config_dir, Config, Mode};
use shellpilot_core::executor::Secret;
use shellpilot_core::llm::{LlmClient, LlmCompletionProvider};
use shellpilot_core::orchestrator::{event_channel, Approver, AutoApprove, Pilot};
use shellpilot_core::output::OutputFormatter;
use shellpilot_core::session::Session;

mod cli;
mod terminal;

const SESSION_ID: &str = "local";

/// How long to wait for the shell's first prompt.
const SHELL_STARTUP: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = get_config_dir() {
        shellpilot_core::logger::init(dir);
    }
    shellpilot_core::info_log!(
        "shellpilot v{} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let formatter = OutputFormatter::new();
    let mut config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            goal,
            auto,
            max_retries,
            sudo_password_env,
        } => {
            if auto {
                config.execution.mode = Mode::Auto;
            }
            if let Some(max_retries) = max_retries {
                config.execution.max_retries = max_retries;
            }
            config.validate().context("Invalid configuration")?;
            let secret = secret_from_env(sudo_password_env.as_deref())?;
            let succeeded = run_goal(&config, &goal.join(" "), secret, &formatter).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }

        Commands::Exec {
            command,
            sudo_password_env,
        } => {
            let secret = secret_from_env(sudo_password_env.as_deref())?;
            let (pilot, session) = connect(&config, Arc::new(AutoApprove)).await?;
            let result = pilot.execute_command(&session, &command, secret.as_ref()).await;
            print!("{}", result.output_after_echo());
            if !result.ok {
                let red = Style::new().red();
                eprintln!(
                    "{}",
                    red.apply_to(result.error.as_deref().unwrap_or("Command failed"))
                );
                std::process::exit(1);
            }
        }

        Commands::Env => {
            let (pilot, session) = connect(&config, Arc::new(AutoApprove)).await?;
            let facts = pilot
                .detect_environment(&session)
                .await
                .context("Environment detection failed")?;
            formatter.print_environment(&facts);
        }

        Commands::Config { path, init } => {
            let target = cli
                .config
                .clone()
                .or_else(shellpilot_core::config::find_config_file)
                .or_else(Config::default_path)
                .context("Could not determine a config file location")?;
            if path {
                println!("{}", target.display());
            } else if init {
                if target.exists() {
                    println!("Config already exists at {}", target.display());
                } else {
                    Config::default()
                        .save(&target)
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                    println!("Wrote default config to {}", target.display());
                }
            } else {
                println!("Config file: {}", target.display());
                formatter.print_config(&config);
            }
        }
    }

    Ok(())
}

fn secret_from_env(var: Option<&str>) -> Result<Option<Secret>> {
    match var {
        Some(var) => {
            let value = std::env::var(var)
                .with_context(|| format!("Environment variable {} is not set", var))?;
            Ok(Some(Secret::new(value)))
        }
        None => Ok(None),
    }
}

/// Spawn the local shell and a pilot wired to the configured provider.
async fn connect(config: &Config, approver: Arc<dyn Approver>) -> Result<(Pilot, Session)> {
    let client = LlmClient::new(config.provider.clone())?;
    let provider = Arc::new(LlmCompletionProvider::new(client));
    let pilot = Pilot::new(provider, approver, config);

    let channel = PtyChannel::spawn(SESSION_ID, std::env::current_dir().ok())?;
    if !channel.wait_ready(SHELL_STARTUP).await {
        shellpilot_core::warn_log!("shell printed nothing within {:?}", SHELL_STARTUP);
    }
    let session = Session::with_window(channel, config.execution.window_chars);
    Ok((pilot, session))
}

async fn run_goal(
    config: &Config,
    goal: &str,
    secret: Option<Secret>,
    formatter: &OutputFormatter,
) -> Result<bool> {
    if config.api_key().is_none() {
        let yellow = Style::new().yellow();
        println!(
            "{}",
            yellow.apply_to(format!(
                "No API key configured; set {} if the endpoint needs one.",
                shellpilot_core::config::API_KEY_ENV
            ))
        );
    }

    let approver: Arc<dyn Approver> = if console::user_attended() {
        Arc::new(TerminalApprover)
    } else {
        Arc::new(AutoApprove)
    };
    let (pilot, session) = connect(config, approver).await?;

    let (tx, mut rx) = event_channel();
    let pilot = Arc::new(pilot.with_events(tx));

    let printer = {
        let formatter = OutputFormatter::new();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                formatter.print_event(&event);
            }
        })
    };

    let interrupt = {
        let pilot = pilot.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shellpilot_core::info_log!("Ctrl-C received");
                // Cancels only the running task; provider calls are dropped with it
                pilot.cancel(SESSION_ID);
            }
        })
    };

    match pilot.detect_environment(&session).await {
        Ok(facts) if !facts.is_empty() => formatter.print_environment(&facts),
        Ok(_) => {}
        Err(e) => shellpilot_core::warn_log!("environment detection failed: {}", e),
    }

    let verdict = pilot.handle_goal(&session, goal, secret.as_ref()).await;

    // Release every event sender so the printer drains and stops
    interrupt.abort();
    let _ = interrupt.await;
    drop(pilot);
    let _ = printer.await;

    Ok(verdict.is_success())
}
