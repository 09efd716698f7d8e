//! Configuration store
//!
//! Loading, saving and validating `config.toml`.

use super::{get_config_dir, API_KEY_ENV};
use crate::error::{PilotError, Result};
use crate::executor::timeout::{millis, TimeoutPolicy};
use crate::executor::ExecutorSettings;
use crate::session::DEFAULT_WINDOW_CHARS;
use crate::stream::interactive::DEFAULT_MAX_INTERACTIVE_RESPONSES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Whether proposed commands need confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Ask,
    Auto,
}

/// How the provider's interpretation and the local classifier combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// The provider's verdict wins; the classifier decides only without one.
    #[default]
    ProviderPreferred,
    /// Success requires the provider and the classifier to agree.
    Conservative,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL, without `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// HTTP-level retries for transient provider failures.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 2,
            retry_base_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: Mode,
    /// Failed attempts allowed before the fix loop gives up.
    pub max_retries: usize,
    pub max_interactive_responses: usize,
    #[serde(with = "millis")]
    pub reply_delay_ms: Duration,
    #[serde(with = "millis")]
    pub settle_delay_ms: Duration,
    #[serde(with = "millis")]
    pub credential_settle_ms: Duration,
    /// Size of the per-session output windows, in characters.
    pub window_chars: usize,
    pub timeouts: TimeoutPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let executor = ExecutorSettings::default();
        Self {
            mode: Mode::Ask,
            max_retries: 10,
            max_interactive_responses: DEFAULT_MAX_INTERACTIVE_RESPONSES,
            reply_delay_ms: executor.reply_delay,
            settle_delay_ms: executor.settle_delay,
            credential_settle_ms: executor.credential_settle,
            window_chars: DEFAULT_WINDOW_CHARS,
            timeouts: executor.timeouts,
        }
    }
}

impl ExecutionConfig {
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            timeouts: self.timeouts,
            reply_delay: self.reply_delay_ms,
            settle_delay: self.settle_delay_ms,
            credential_settle: self.credential_settle_ms,
            max_interactive_responses: self.max_interactive_responses,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub trust: TrustPolicy,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PilotError::ConfigNotFound {
                path: path.to_path_buf(),
            },
            _ => PilotError::Io(e),
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        get_config_dir().map(|d| d.join("config.toml"))
    }

    /// Load from `path`, the standard locations, or fall back to defaults.
    /// The API key environment variable is applied last.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path.map(Path::to_path_buf).or_else(super::find_config_file) {
            Some(path) => {
                crate::debug_log!("Loading config from {}", path.display());
                Self::load(&path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.provider.api_key = Some(key.trim().to_string());
            }
        }
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(PilotError::InvalidConfig {
                message: message.to_string(),
            })
        };

        let url = self.provider.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return invalid("provider.base_url must start with http:// or https://");
        }
        if self.provider.model.trim().is_empty() {
            return invalid("provider.model cannot be empty");
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return invalid("provider.temperature must be between 0.0 and 2.0");
        }
        if self.provider.timeout_secs == 0 {
            return invalid("provider.timeout_secs must be positive");
        }
        if self.execution.max_retries == 0 {
            return invalid("execution.max_retries must be at least 1");
        }
        if self.execution.window_chars < 1000 {
            return invalid("execution.window_chars must be at least 1000");
        }
        let t = &self.execution.timeouts;
        if t.default.is_zero() || t.medium.is_zero() || t.long.is_zero() {
            return invalid("execution.timeouts must all be positive");
        }
        Ok(())
    }

    /// The configured API key, if it is set to something usable.
    pub fn api_key(&self) -> Option<&str> {
        self.provider
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case("none"))
    }
}
