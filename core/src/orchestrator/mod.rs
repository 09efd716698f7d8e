//! Retry/fix orchestration and plan execution
//!
//! [`Pilot`] drives a goal through the provider, the approver and the
//! execution controller:
//! `propose -> confirm? -> execute -> interpret -> {success | permanent | fix -> ...}`.
//! Plans run step by step through the same execute/interpret path.

pub mod approval;
pub mod events;
pub mod plan;
pub mod policy;
pub mod retry;

use crate::config::{Config, Mode, TrustPolicy};
use crate::context::{self, EnvironmentFacts};
use crate::error::Result;
use crate::executor::{CommandExecutor, ExecutionRequest, ExecutionResult, ExitClass, SafetyChecker, Secret};
use crate::llm::{CompletionProvider, FixRequest, GoalRequest, InterpretRequest};
use crate::protocol::{Envelope, Plan, Risk, StepStatus};
use crate::session::{Session, HISTORY_LIMIT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use approval::{Approver, AutoApprove, StepDecision};
pub use events::{event_channel, EventReceiver, EventSender, PilotEvent};
pub use plan::{PlanOutcome, PlanReport};
pub use policy::{assess, Assessment};
pub use retry::{RetryState, TaskVerdict, IMPOSSIBLE_ROOT_CAUSE};

/// Characters of recent output sent with a new goal.
pub const RECENT_OUTPUT_CHARS: usize = 4000;

/// Orchestration knobs taken from `[execution]` and `[policy]`.
#[derive(Debug, Clone, Copy)]
pub struct PilotSettings {
    pub mode: Mode,
    pub max_retries: usize,
    pub trust: TrustPolicy,
}

impl PilotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.execution.mode,
            max_retries: config.execution.max_retries,
            trust: config.policy.trust,
        }
    }
}

/// A command waiting for confirmation and execution.
#[derive(Debug, Clone)]
struct Proposal {
    command: String,
    explanation: String,
    high_risk: bool,
}

struct ActiveTask {
    id: Uuid,
    token: CancellationToken,
}

/// Registration of the running task on a session. Dropping it unregisters
/// the task unless a newer one took over.
struct TaskGuard<'a> {
    tasks: &'a Mutex<HashMap<String, ActiveTask>>,
    session_id: String,
    id: Uuid,
    token: CancellationToken,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        if tasks.get(&self.session_id).map(|t| t.id) == Some(self.id) {
            tasks.remove(&self.session_id);
        }
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

pub struct Pilot {
    provider: Arc<dyn CompletionProvider>,
    approver: Arc<dyn Approver>,
    executor: CommandExecutor,
    settings: PilotSettings,
    safety: SafetyChecker,
    events: Option<EventSender>,
    tasks: Mutex<HashMap<String, ActiveTask>>,
}

impl Pilot {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        approver: Arc<dyn Approver>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            approver,
            executor: CommandExecutor::new(config.execution.executor_settings()),
            settings: PilotSettings::from_config(config),
            safety: SafetyChecker::new(),
            events: None,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn settings(&self) -> &PilotSettings {
        &self.settings
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Cancel the task running on `session_id`. Returns false when idle.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.tasks.lock().get(session_id) {
            Some(task) => {
                crate::info_log!("[{}] cancellation requested", session_id);
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self, session_id: &str) -> bool {
        self.tasks.lock().contains_key(session_id)
    }

    fn begin_task(&self, session_id: &str) -> TaskGuard<'_> {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let previous = self.tasks.lock().insert(
            session_id.to_string(),
            ActiveTask {
                id,
                token: token.clone(),
            },
        );
        if previous.is_some() {
            crate::warn_log!(
                "[{}] a task is already running; the new task takes over cancellation",
                session_id
            );
        }
        TaskGuard {
            tasks: &self.tasks,
            session_id: session_id.to_string(),
            id,
            token,
        }
    }

    fn emit(&self, event: PilotEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn status(&self, session: &Session, message: impl Into<String>) {
        self.emit(PilotEvent::Status {
            session_id: session.id().to_string(),
            message: message.into(),
        });
    }

    /// Inspect the target system and remember the facts on the session.
    pub async fn detect_environment(&self, session: &Session) -> Result<EnvironmentFacts> {
        let task = self.begin_task(session.id());
        self.status(session, "Detecting target environment");
        context::detect_environment(&self.executor, session, &task.token).await
    }

    /// Run one command without confirmation, interpretation or retries.
    pub async fn execute_command(
        &self,
        session: &Session,
        command: &str,
        secret: Option<&Secret>,
    ) -> ExecutionResult {
        let task = self.begin_task(session.id());
        self.run_command(session, command, secret, &task.token).await
    }

    /// Ask the provider what to do about `goal` and carry it out.
    pub async fn handle_goal(&self, session: &Session, goal: &str, secret: Option<&Secret>) -> TaskVerdict {
        let task = self.begin_task(session.id());
        let cancel = &task.token;

        session.push_history(format!("user: {}", goal));
        let request = GoalRequest {
            goal: goal.to_string(),
            recent_output: session.recent_output(RECENT_OUTPUT_CHARS),
            history: session.recent_history(HISTORY_LIMIT),
            environment: session.environment(),
        };
        self.status(session, "Thinking");

        let verdict = match cancellable(cancel, self.provider.propose(&request)).await {
            None => TaskVerdict::Cancelled,
            Some(Err(e)) => {
                crate::error_log!("[{}] proposal failed: {}", session.id(), e);
                TaskVerdict::ProviderFailed {
                    message: e.user_message(),
                }
            }
            Some(Ok(envelope)) => {
                crate::debug_log!("[{}] provider answered with {}", session.id(), envelope.kind());
                match envelope {
                    Envelope::Command {
                        command,
                        explanation,
                        risk,
                        ..
                    } => {
                        let proposal = Proposal {
                            command,
                            explanation,
                            high_risk: risk == Risk::High,
                        };
                        self.retry_loop(session, goal, proposal, secret, cancel).await
                    }
                    Envelope::Fix {
                        command,
                        explanation,
                        ..
                    } => {
                        let proposal = Proposal {
                            command,
                            explanation,
                            high_risk: false,
                        };
                        self.retry_loop(session, goal, proposal, secret, cancel).await
                    }
                    Envelope::Plan(plan) => {
                        TaskVerdict::Plan(self.plan_loop(session, goal, plan, secret, cancel).await)
                    }
                    other => self.surface(session, other),
                }
            }
        };

        self.finish(session, verdict)
    }

    /// Run `initial` and repair it until it succeeds or a stop condition hits.
    pub async fn run_with_retries(
        &self,
        session: &Session,
        goal: &str,
        initial: &str,
        secret: Option<&Secret>,
    ) -> TaskVerdict {
        let task = self.begin_task(session.id());
        let proposal = Proposal {
            command: initial.to_string(),
            explanation: String::new(),
            high_risk: false,
        };
        let verdict = self.retry_loop(session, goal, proposal, secret, &task.token).await;
        self.finish(session, verdict)
    }

    /// Execute `plan` step by step.
    pub async fn run_plan(&self, session: &Session, goal: &str, plan: Plan, secret: Option<&Secret>) -> PlanReport {
        let task = self.begin_task(session.id());
        self.plan_loop(session, goal, plan, secret, &task.token).await
    }

    fn finish(&self, session: &Session, verdict: TaskVerdict) -> TaskVerdict {
        crate::info_log!("[{}] task finished: {}", session.id(), verdict.label());
        self.emit(PilotEvent::Finished {
            session_id: session.id().to_string(),
            verdict: verdict.clone(),
        });
        verdict
    }

    /// Envelopes that end the task without running anything.
    fn surface(&self, session: &Session, envelope: Envelope) -> TaskVerdict {
        match envelope {
            Envelope::Info { answer } => {
                session.push_history(format!("assistant: {}", answer));
                TaskVerdict::Info { answer }
            }
            Envelope::Clarification { question, options } => {
                session.push_history(format!("assistant: {}", question));
                TaskVerdict::NeedsClarification { question, options }
            }
            Envelope::Impossible { reason, suggestion } => TaskVerdict::PermanentFailure {
                reason,
                root_cause: IMPOSSIBLE_ROOT_CAUSE.to_string(),
                suggestion,
            },
            Envelope::Abort {
                reason,
                root_cause,
                suggestion,
            } => TaskVerdict::PermanentFailure {
                reason,
                root_cause,
                suggestion,
            },
            Envelope::Command { .. } | Envelope::Fix { .. } | Envelope::Plan(_) => {
                TaskVerdict::ProviderFailed {
                    message: format!("unexpected {} response", envelope.kind()),
                }
            }
        }
    }

    async fn run_command(
        &self,
        session: &Session,
        command: &str,
        secret: Option<&Secret>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        self.emit(PilotEvent::ExecutionStarted {
            session_id: session.id().to_string(),
            command: command.to_string(),
        });
        session.push_history(format!("$ {}", command));

        let request = ExecutionRequest::new(command).with_secret(secret.cloned());
        let result = self.executor.execute(session, request, cancel).await;

        self.emit(PilotEvent::ExecutionFinished {
            session_id: session.id().to_string(),
            result: result.clone(),
        });
        result
    }

    /// Interpret a finished execution under the trust policy. `None` when
    /// cancelled while waiting for the provider.
    async fn judge(
        &self,
        session: &Session,
        goal: &str,
        result: &ExecutionResult,
        cancel: &CancellationToken,
    ) -> Option<Assessment> {
        let request = InterpretRequest {
            goal: goal.to_string(),
            command: result.command.clone(),
            output: result.output_after_echo().to_string(),
            history: session.recent_history(HISTORY_LIMIT),
            environment: session.environment(),
        };

        let interpretation = match cancellable(cancel, self.provider.interpret(&request)).await? {
            Ok(interpretation) => interpretation,
            Err(e) => {
                crate::warn_log!("[{}] interpretation unavailable: {}", session.id(), e);
                None
            }
        };

        if let Some(interp) = &interpretation {
            if !interp.answer.is_empty() {
                session.push_history(format!("assistant: {}", interp.answer));
            }
            self.emit(PilotEvent::Interpreted {
                session_id: session.id().to_string(),
                command: result.command.clone(),
                interpretation: interp.clone(),
            });
        }

        let assessment = policy::assess(self.settings.trust, result, interpretation.as_ref());
        crate::debug_log!(
            "[{}] assessed {:?}: success={} permanent={}",
            session.id(),
            result.exit,
            assessment.success,
            assessment.permanent
        );
        Some(assessment)
    }

    /// Ask the approver when required. `None` when cancelled.
    async fn confirm(&self, session: &Session, proposal: &Proposal, cancel: &CancellationToken) -> Option<bool> {
        let safety = self.safety.assess_line(&proposal.command);
        if safety.is_dangerous() {
            crate::warn_log!("[{}] {}", session.id(), safety.reason());
        }
        let high_risk = proposal.high_risk || safety.is_dangerous();

        self.emit(PilotEvent::CommandProposed {
            session_id: session.id().to_string(),
            command: proposal.command.clone(),
            explanation: proposal.explanation.clone(),
            high_risk,
        });

        if self.settings.mode == Mode::Auto && !high_risk {
            return Some(true);
        }
        cancellable(
            cancel,
            self.approver
                .confirm_command(&proposal.command, &proposal.explanation, high_risk),
        )
        .await
    }

    async fn retry_loop(
        &self,
        session: &Session,
        goal: &str,
        mut proposal: Proposal,
        secret: Option<&Secret>,
        cancel: &CancellationToken,
    ) -> TaskVerdict {
        let mut state = RetryState::new();

        loop {
            if proposal.command.trim().is_empty() {
                return TaskVerdict::ProviderFailed {
                    message: "No command was returned by the provider.".to_string(),
                };
            }
            if cancel.is_cancelled() {
                return TaskVerdict::Cancelled;
            }

            match self.confirm(session, &proposal, cancel).await {
                None => return TaskVerdict::Cancelled,
                Some(false) => {
                    crate::info_log!("[{}] declined: {}", session.id(), proposal.command);
                    return TaskVerdict::Declined;
                }
                Some(true) => {}
            }

            let result = self.run_command(session, &proposal.command, secret, cancel).await;
            match result.exit {
                ExitClass::Cancelled => return TaskVerdict::Cancelled,
                ExitClass::TimedOut => {
                    return TaskVerdict::TimedOut {
                        command: result.command,
                    }
                }
                ExitClass::TransportError => {
                    return TaskVerdict::TransportError {
                        message: result.error.unwrap_or_else(|| "Shell channel failed".to_string()),
                    }
                }
                ExitClass::CredentialRequired => {
                    return TaskVerdict::CredentialRequired {
                        command: result.command,
                    }
                }
                ExitClass::Success | ExitClass::Error => {}
            }

            let Some(assessment) = self.judge(session, goal, &result, cancel).await else {
                return TaskVerdict::Cancelled;
            };
            if assessment.success {
                return TaskVerdict::Success {
                    command: result.command,
                    answer: assessment.answer,
                };
            }
            if assessment.permanent {
                return TaskVerdict::PermanentFailure {
                    reason: assessment
                        .answer
                        .unwrap_or_else(|| "The command cannot succeed on this system.".to_string()),
                    root_cause: assessment.failure_category.unwrap_or_else(|| "unknown".to_string()),
                    suggestion: None,
                };
            }

            state.record_failure(&result.command);
            if state.attempts() >= self.settings.max_retries {
                crate::warn_log!("[{}] giving up after {} attempts", session.id(), state.attempts());
                return TaskVerdict::MaxRetries {
                    attempts: state.attempts(),
                    last_command: result.command,
                };
            }

            self.emit(PilotEvent::FixRequested {
                session_id: session.id().to_string(),
                attempt: state.attempts(),
                failed_commands: state.failed_commands().to_vec(),
            });
            self.status(session, "Command failed. Attempting to fix...");

            let request = FixRequest {
                goal: goal.to_string(),
                failed_output: failure_output(&result),
                failed_commands: state.failed_commands().to_vec(),
                history: session.recent_history(HISTORY_LIMIT),
                environment: session.environment(),
            };
            let envelope = match cancellable(cancel, self.provider.fix(&request)).await {
                None => return TaskVerdict::Cancelled,
                Some(Err(e)) => {
                    crate::error_log!("[{}] fix request failed: {}", session.id(), e);
                    return TaskVerdict::ProviderFailed {
                        message: e.user_message(),
                    };
                }
                Some(Ok(envelope)) => envelope,
            };

            proposal = match envelope {
                Envelope::Fix {
                    command,
                    explanation,
                    ..
                } => Proposal {
                    command,
                    explanation,
                    high_risk: false,
                },
                Envelope::Command {
                    command,
                    explanation,
                    risk,
                    ..
                } => Proposal {
                    command,
                    explanation,
                    high_risk: risk == Risk::High,
                },
                Envelope::Plan(plan) => {
                    return TaskVerdict::Plan(self.plan_loop(session, goal, plan, secret, cancel).await);
                }
                other => return self.surface(session, other),
            };

            if state.is_repeat(&proposal.command) {
                crate::warn_log!(
                    "[{}] fix repeats a failed command, stopping: {}",
                    session.id(),
                    proposal.command
                );
                return TaskVerdict::LoopPrevented {
                    command: proposal.command.trim().to_string(),
                };
            }
        }
    }

    fn set_step_status(&self, session: &Session, plan: &mut Plan, index: usize, status: StepStatus) {
        plan.steps[index].status = status;
        self.emit(PilotEvent::StepStatusChanged {
            session_id: session.id().to_string(),
            index,
            command: plan.steps[index].command.clone(),
            status,
        });
    }

    async fn plan_loop(
        &self,
        session: &Session,
        goal: &str,
        mut plan: Plan,
        secret: Option<&Secret>,
        cancel: &CancellationToken,
    ) -> PlanReport {
        let mut skipped = vec![false; plan.steps.len()];
        let end = self
            .plan_steps(session, goal, &mut plan, &mut skipped, secret, cancel)
            .await;

        let mut report = PlanReport::new(plan, end.outcome, &skipped);
        if let Some(message) = end.message {
            report = report.with_failure(message, end.root_cause);
        }
        crate::info_log!(
            "[{}] plan '{}' {:?}: {} done, {} failed, {} skipped",
            session.id(),
            report.plan.title,
            report.outcome,
            report.done,
            report.failed,
            report.skipped
        );
        self.emit(PilotEvent::PlanFinished {
            session_id: session.id().to_string(),
            report: report.clone(),
        });
        report
    }

    async fn plan_steps(
        &self,
        session: &Session,
        goal: &str,
        plan: &mut Plan,
        skipped: &mut [bool],
        secret: Option<&Secret>,
        cancel: &CancellationToken,
    ) -> PlanEnd {
        let total = plan.steps.len();
        self.emit(PilotEvent::PlanStarted {
            session_id: session.id().to_string(),
            plan: plan.clone(),
        });

        if total == 0 {
            return PlanEnd::new(PlanOutcome::Completed);
        }

        if self.settings.mode == Mode::Ask {
            match cancellable(cancel, self.approver.confirm_plan(plan)).await {
                None => return PlanEnd::new(PlanOutcome::Cancelled),
                Some(false) => return PlanEnd::new(PlanOutcome::Declined),
                Some(true) => {}
            }
        }

        let mut index = 0;
        while index < total {
            if cancel.is_cancelled() {
                return PlanEnd::new(PlanOutcome::Cancelled);
            }

            let command = plan.steps[index].command.clone();
            // A confirmed plan covers its steps; unattended runs still stop
            // for destructive ones
            if self.settings.mode == Mode::Auto && self.safety.assess_line(&command).is_dangerous() {
                let proposal = Proposal {
                    command: command.clone(),
                    explanation: plan.steps[index].description.clone(),
                    high_risk: true,
                };
                match self.confirm(session, &proposal, cancel).await {
                    None => return PlanEnd::new(PlanOutcome::Cancelled),
                    Some(false) => {
                        crate::warn_log!("[{}] destructive step {} refused", session.id(), index + 1);
                        self.set_step_status(session, plan, index, StepStatus::Failed);
                        let message = format!("Refused destructive step {}: {}", index + 1, command);
                        return PlanEnd::failed(PlanOutcome::Stopped, message, None);
                    }
                    Some(true) => {}
                }
            }

            self.set_step_status(session, plan, index, StepStatus::Running);
            let result = self.run_command(session, &command, secret, cancel).await;

            if result.exit == ExitClass::Cancelled || cancel.is_cancelled() {
                self.set_step_status(session, plan, index, StepStatus::Failed);
                return PlanEnd::new(PlanOutcome::Cancelled);
            }
            if result.exit == ExitClass::TransportError {
                self.set_step_status(session, plan, index, StepStatus::Failed);
                let message = result.error.unwrap_or_else(|| "Shell channel failed".to_string());
                return PlanEnd::failed(PlanOutcome::Stopped, message, None);
            }

            let fallback = || format!("Step {} failed", index + 1);
            let (success, permanent, message, root_cause) = match result.exit {
                ExitClass::Success | ExitClass::Error => {
                    let Some(assessment) = self.judge(session, goal, &result, cancel).await else {
                        self.set_step_status(session, plan, index, StepStatus::Failed);
                        return PlanEnd::new(PlanOutcome::Cancelled);
                    };
                    let message = assessment
                        .answer
                        .or_else(|| result.error.clone())
                        .unwrap_or_else(fallback);
                    (
                        assessment.success,
                        assessment.permanent,
                        message,
                        assessment.failure_category,
                    )
                }
                // Timed out or needs credentials
                _ => (
                    false,
                    false,
                    result.error.clone().unwrap_or_else(fallback),
                    None,
                ),
            };

            if success {
                self.set_step_status(session, plan, index, StepStatus::Done);
                index += 1;
                continue;
            }

            self.set_step_status(session, plan, index, StepStatus::Failed);
            if permanent {
                crate::warn_log!("[{}] step {} failed permanently", session.id(), index + 1);
                let root_cause = root_cause.unwrap_or_else(|| "unknown".to_string());
                return PlanEnd::failed(PlanOutcome::Impossible, message, Some(root_cause));
            }
            if index + 1 >= total {
                return PlanEnd::failed(PlanOutcome::CompletedWithFailures, message, None);
            }

            match cancellable(cancel, self.approver.on_step_failure(plan, index, &message)).await {
                None => return PlanEnd::new(PlanOutcome::Cancelled),
                Some(StepDecision::Retry) => {
                    crate::info_log!("[{}] retrying step {}", session.id(), index + 1);
                }
                Some(StepDecision::Skip) => {
                    skipped[index] = true;
                    index += 1;
                }
                Some(StepDecision::Stop) => {
                    return PlanEnd::failed(PlanOutcome::Stopped, message, None);
                }
            }
        }

        if plan.steps.iter().all(|s| s.status == StepStatus::Done) {
            PlanEnd::new(PlanOutcome::Completed)
        } else {
            PlanEnd::new(PlanOutcome::CompletedWithFailures)
        }
    }
}

/// How the step loop ended.
struct PlanEnd {
    outcome: PlanOutcome,
    message: Option<String>,
    root_cause: Option<String>,
}

impl PlanEnd {
    fn new(outcome: PlanOutcome) -> Self {
        Self {
            outcome,
            message: None,
            root_cause: None,
        }
    }

    fn failed(outcome: PlanOutcome, message: String, root_cause: Option<String>) -> Self {
        Self {
            outcome,
            message: Some(message),
            root_cause,
        }
    }
}

/// Output handed to the provider when asking for a fix.
fn failure_output(result: &ExecutionResult) -> String {
    let mut out = result.output_after_echo().trim().to_string();
    if let Some(error) = &result.error {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(error);
    }
    if out.is_empty() {
        out.push_str("Unknown error");
    }
    out
}
