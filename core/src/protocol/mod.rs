//! Provider response protocol
//!
//! The completion provider answers with a JSON object tagged by `type`.
//! Every response kind is a variant of [`Envelope`] so dispatch over it is
//! exhaustive. Field names accept both snake_case and the camelCase most
//! models produce.

pub mod parser;

use serde::{Deserialize, Deserializer, Serialize};

pub use parser::{parse_envelope, parse_interpretation, ResponseContext};

/// Provider-declared risk of a proposed command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Risk {
    #[default]
    Low,
    Medium,
    High,
}

impl From<String> for Risk {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Risk::High,
            "medium" => Risk::Medium,
            _ => Risk::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl From<String> for Confidence {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Confidence::High,
            "low" => Confidence::Low,
            _ => Confidence::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum EstimatedTime {
    #[default]
    Fast,
    Moderate,
    Slow,
}

impl From<String> for EstimatedTime {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "slow" => EstimatedTime::Slow,
            "moderate" => EstimatedTime::Moderate,
            _ => EstimatedTime::Fast,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default, deserialize_with = "null_default")]
    pub command: String,
    #[serde(default, deserialize_with = "null_default")]
    pub description: String,
    #[serde(default, skip_deserializing)]
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
            status: StepStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, deserialize_with = "null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub steps: Vec<PlanStep>,
    #[serde(default, deserialize_with = "null_default")]
    pub explanation: String,
}

impl Plan {
    pub fn new(title: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            title: title.into(),
            steps,
            explanation: String::new(),
        }
    }
}

/// Every response kind the provider may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Command {
        #[serde(default, deserialize_with = "null_default")]
        command: String,
        #[serde(default, deserialize_with = "null_default")]
        explanation: String,
        #[serde(default, deserialize_with = "null_default")]
        risk: Risk,
        #[serde(default, alias = "estimatedTime", deserialize_with = "null_default")]
        estimated_time: EstimatedTime,
    },
    Plan(Plan),
    Info {
        #[serde(default, deserialize_with = "null_default")]
        answer: String,
    },
    Impossible {
        #[serde(default, deserialize_with = "null_default")]
        reason: String,
        #[serde(default)]
        suggestion: Option<String>,
    },
    Clarification {
        #[serde(default, deserialize_with = "null_default")]
        question: String,
        #[serde(default, deserialize_with = "null_default")]
        options: Vec<String>,
    },
    Fix {
        #[serde(default, deserialize_with = "null_default")]
        command: String,
        #[serde(default, deserialize_with = "null_default")]
        explanation: String,
        #[serde(default, deserialize_with = "null_default")]
        confidence: Confidence,
    },
    Abort {
        #[serde(default, deserialize_with = "null_default")]
        reason: String,
        #[serde(default, alias = "rootCause", deserialize_with = "null_default")]
        root_cause: String,
        #[serde(default)]
        suggestion: Option<String>,
    },
}

impl Envelope {
    /// Short name of the variant, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Command { .. } => "command",
            Envelope::Plan(_) => "plan",
            Envelope::Info { .. } => "info",
            Envelope::Impossible { .. } => "impossible",
            Envelope::Clarification { .. } => "clarification",
            Envelope::Fix { .. } => "fix",
            Envelope::Abort { .. } => "abort",
        }
    }
}

/// The provider's reading of a command's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, deserialize_with = "null_default")]
    pub answer: String,
    #[serde(default, alias = "permanentFailure")]
    pub permanent_failure: bool,
    #[serde(default, alias = "failureCategory")]
    pub failure_category: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Treat an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
