//! Structured error types for shellpilot
//!
//! Library-level failures (transport, provider, configuration). Command
//! failures on the remote side are *not* errors: they are reported through
//! `ExecutionResult` and the orchestrator verdicts.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for shellpilot operations
#[derive(Error, Debug)]
pub enum PilotError {
    // =========================================================================
    // Transport / Session Errors
    // =========================================================================
    /// Writing to the shell channel failed
    #[error("shell write failed: {message}")]
    ChannelWrite { message: String },

    /// The channel is closed or was never opened
    #[error("session closed: {session_id}")]
    SessionClosed { session_id: String },

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// Completion provider returned a transport/API failure
    #[error("provider error: {message}")]
    Provider { message: String },

    /// Provider returned an HTTP status error
    #[error("provider status error: {status} - {message}")]
    ProviderStatus { status: u16, message: String },

    /// Rate limit exceeded (429)
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider output could not be used at all
    #[error("unusable provider response: {reason}")]
    UnusableResponse { reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Config file not readable
    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Operation cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Timeout
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML error: {0}")]
    Toml(String),
}

impl PilotError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::ChannelWrite { .. } | Self::SessionClosed { .. } => {
                "The shell session is no longer writable. Reconnect and try again.".to_string()
            }
            Self::ProviderStatus { status: 401 | 403, .. } => {
                "The completion provider rejected the API key. Check provider.api_key.".to_string()
            }
            Self::RateLimited { .. } => {
                "The completion provider is rate limiting requests. Please wait a moment.".to_string()
            }
            Self::Cancelled => "Execution cancelled by user.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Convert from anyhow::Error to PilotError
impl From<anyhow::Error> for PilotError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<PilotError>() {
            Ok(pilot_err) => return pilot_err,
            Err(err) => err,
        };
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Self::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }

        Self::Provider {
            message: format!("{:#}", err),
        }
    }
}

impl From<serde_json::Error> for PilotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<toml::de::Error> for PilotError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for PilotError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Toml(err.to_string())
    }
}

/// Result type alias using PilotError
pub type Result<T> = std::result::Result<T, PilotError>;
