//! Progress events for whoever renders the session.

use super::plan::PlanReport;
use super::retry::TaskVerdict;
use crate::executor::ExecutionResult;
use crate::protocol::{Interpretation, Plan, StepStatus};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PilotEvent {
    Status {
        session_id: String,
        message: String,
    },
    CommandProposed {
        session_id: String,
        command: String,
        explanation: String,
        high_risk: bool,
    },
    ExecutionStarted {
        session_id: String,
        command: String,
    },
    ExecutionFinished {
        session_id: String,
        result: ExecutionResult,
    },
    Interpreted {
        session_id: String,
        command: String,
        interpretation: Interpretation,
    },
    FixRequested {
        session_id: String,
        attempt: usize,
        failed_commands: Vec<String>,
    },
    PlanStarted {
        session_id: String,
        plan: Plan,
    },
    StepStatusChanged {
        session_id: String,
        index: usize,
        command: String,
        status: StepStatus,
    },
    PlanFinished {
        session_id: String,
        report: PlanReport,
    },
    Finished {
        session_id: String,
        verdict: TaskVerdict,
    },
}

impl PilotEvent {
    pub fn session_id(&self) -> &str {
        match self {
            PilotEvent::Status { session_id, .. }
            | PilotEvent::CommandProposed { session_id, .. }
            | PilotEvent::ExecutionStarted { session_id, .. }
            | PilotEvent::ExecutionFinished { session_id, .. }
            | PilotEvent::Interpreted { session_id, .. }
            | PilotEvent::FixRequested { session_id, .. }
            | PilotEvent::PlanStarted { session_id, .. }
            | PilotEvent::StepStatusChanged { session_id, .. }
            | PilotEvent::PlanFinished { session_id, .. }
            | PilotEvent::Finished { session_id, .. } => session_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<PilotEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PilotEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
