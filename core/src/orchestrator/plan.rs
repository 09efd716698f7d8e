//! Plan execution results

use crate::protocol::{Plan, StepStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
    /// Every step is done.
    Completed,
    /// Reached the end with failed or skipped steps.
    CompletedWithFailures,
    /// The approver chose to stop, or the session broke.
    Stopped,
    /// A step failed permanently.
    Impossible,
    Cancelled,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub plan: Plan,
    pub outcome: PlanOutcome,
    pub done: usize,
    /// Failed steps that were not skipped.
    pub failed: usize,
    pub skipped: usize,
    pub root_cause: Option<String>,
    pub message: Option<String>,
}

impl PlanReport {
    /// Count step statuses. `skipped` holds one flag per step.
    pub fn new(plan: Plan, outcome: PlanOutcome, skipped: &[bool]) -> Self {
        let done = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Done)
            .count();
        let skipped_count = plan
            .steps
            .iter()
            .zip(skipped)
            .filter(|(s, &flag)| flag && s.status == StepStatus::Failed)
            .count();
        let failed = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count()
            - skipped_count;

        Self {
            plan,
            outcome,
            done,
            failed,
            skipped: skipped_count,
            root_cause: None,
            message: None,
        }
    }

    pub fn with_failure(mut self, message: impl Into<String>, root_cause: Option<String>) -> Self {
        self.message = Some(message.into());
        self.root_cause = root_cause;
        self
    }

    pub fn total(&self) -> usize {
        self.plan.steps.len()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PlanOutcome::Completed
    }
}
