//! Configuration
//!
//! A single TOML file holds provider, execution and policy settings. The
//! working directory's `shellpilot.toml` wins over the per-user file.

pub mod store;

use std::path::PathBuf;

pub use store::{Config, ExecutionConfig, Mode, PolicyConfig, ProviderConfig, TrustPolicy};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "shellpilot.toml";

/// Environment variable overriding `provider.api_key`.
pub const API_KEY_ENV: &str = "SHELLPILOT_API_KEY";

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(LOCAL_CONFIG_FILE);
        if path.exists() {
            return Some(path);
        }
    }

    Config::default_path().filter(|path| path.exists())
}

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Some(dir.join("shellpilot"));
    }

    dirs::home_dir().map(|home| home.join(".config").join("shellpilot"))
}
