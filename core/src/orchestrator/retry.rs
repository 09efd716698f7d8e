//! Retry bookkeeping and task verdicts

use super::plan::PlanReport;
use serde::Serialize;

/// Root cause reported for provider `impossible` answers.
pub const IMPOSSIBLE_ROOT_CAUSE: &str = "impossible";

/// Failed commands for one logical task.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    failed: Vec<String>,
    attempts: usize,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a failed attempt and remember its command.
    pub fn record_failure(&mut self, command: &str) {
        self.attempts += 1;
        let command = command.trim();
        if !self.is_repeat(command) {
            self.failed.push(command.to_string());
        }
    }

    /// Whether `command` already failed for this task.
    pub fn is_repeat(&self, command: &str) -> bool {
        let command = command.trim();
        self.failed.iter().any(|c| c == command)
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn failed_commands(&self) -> &[String] {
        &self.failed
    }
}

/// Terminal state of a goal, a retry loop or a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskVerdict {
    Success {
        command: String,
        answer: Option<String>,
    },
    /// Declared by the provider (`abort`, `impossible`) or by the interpretation.
    PermanentFailure {
        reason: String,
        root_cause: String,
        suggestion: Option<String>,
    },
    /// A fix repeated a command that already failed.
    LoopPrevented {
        command: String,
    },
    MaxRetries {
        attempts: usize,
        last_command: String,
    },
    /// The remote process may still be running.
    TimedOut {
        command: String,
    },
    TransportError {
        message: String,
    },
    CredentialRequired {
        command: String,
    },
    Declined,
    Cancelled,
    ProviderFailed {
        message: String,
    },
    Info {
        answer: String,
    },
    NeedsClarification {
        question: String,
        options: Vec<String>,
    },
    Plan(PlanReport),
}

impl TaskVerdict {
    /// True only when every executed command reached its goal.
    pub fn is_success(&self) -> bool {
        match self {
            TaskVerdict::Success { .. } => true,
            TaskVerdict::Plan(report) => report.is_success(),
            _ => false,
        }
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            TaskVerdict::Success { .. } => "success",
            TaskVerdict::PermanentFailure { .. } => "permanent failure",
            TaskVerdict::LoopPrevented { .. } => "loop prevented",
            TaskVerdict::MaxRetries { .. } => "max retries",
            TaskVerdict::TimedOut { .. } => "timed out",
            TaskVerdict::TransportError { .. } => "transport error",
            TaskVerdict::CredentialRequired { .. } => "credentials required",
            TaskVerdict::Declined => "declined",
            TaskVerdict::Cancelled => "cancelled",
            TaskVerdict::ProviderFailed { .. } => "provider failed",
            TaskVerdict::Info { .. } => "info",
            TaskVerdict::NeedsClarification { .. } => "needs clarification",
            TaskVerdict::Plan(_) => "plan",
        }
    }
}
