//! Human approval seam

use crate::protocol::Plan;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What to do after a plan step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDecision {
    /// Run the same step again
    Retry,
    /// Leave it failed and continue with the next step
    Skip,
    /// End the plan
    Stop,
}

#[async_trait]
pub trait Approver: Send + Sync {
    /// Ask before running a command. `high_risk` is set for provider-declared
    /// or locally detected destructive commands.
    async fn confirm_command(&self, command: &str, explanation: &str, high_risk: bool) -> bool;

    async fn confirm_plan(&self, plan: &Plan) -> bool;

    async fn on_step_failure(&self, plan: &Plan, index: usize, error: &str) -> StepDecision;
}

/// Unattended approver: accepts everything except high-risk commands and
/// stops plans on the first failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl Approver for AutoApprove {
    async fn confirm_command(&self, command: &str, _explanation: &str, high_risk: bool) -> bool {
        if high_risk {
            crate::warn_log!("Refusing unattended high-risk command: {}", command);
        }
        !high_risk
    }

    async fn confirm_plan(&self, _plan: &Plan) -> bool {
        true
    }

    async fn on_step_failure(&self, _plan: &Plan, _index: usize, _error: &str) -> StepDecision {
        StepDecision::Stop
    }
}
