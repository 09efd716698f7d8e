//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive a shell toward a goal with an LLM, fixing failed commands as it goes
///
/// Works with OpenAI-compatible endpoints (OpenAI, OpenRouter, Ollama, LM Studio).
#[derive(Parser, Debug)]
#[command(name = "shellpilot")]
#[command(author, about, long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the default lookup
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accomplish a goal: propose, run, interpret and fix commands
    Run {
        /// What you want done, in plain language
        #[arg(num_args = 1.., required = true)]
        goal: Vec<String>,

        /// Run low-risk commands without asking
        #[arg(short, long)]
        auto: bool,

        /// Attempts before giving up (overrides config)
        #[arg(long)]
        max_retries: Option<usize>,

        /// Environment variable holding the sudo password
        #[arg(long, value_name = "VAR")]
        sudo_password_env: Option<String>,
    },

    /// Run a single command through the execution controller
    Exec {
        /// The command line to run
        command: String,

        /// Environment variable holding the sudo password
        #[arg(long, value_name = "VAR")]
        sudo_password_env: Option<String>,
    },

    /// Detect and show the target environment
    Env,

    /// Show the active configuration
    Config {
        /// Only print the config file path
        #[arg(long)]
        path: bool,

        /// Write a default config file if none exists
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },
}
