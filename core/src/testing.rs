//! Test doubles shared by the unit tests.

use crate::error::{PilotError, Result};
use crate::llm::provider::{CompletionProvider, FixRequest, GoalRequest, InterpretRequest};
use crate::orchestrator::approval::{Approver, StepDecision};
use crate::protocol::{Envelope, Interpretation, Plan};
use crate::session::{ChannelEvent, ShellChannel};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// In-memory shell. Each write pops the next scripted reply and publishes
/// its chunks to subscribers.
pub struct MockChannel {
    id: String,
    alive: AtomicBool,
    fail_writes: AtomicBool,
    interrupts: AtomicUsize,
    writes: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<Vec<String>>>,
    tx: broadcast::Sender<ChannelEvent>,
}

impl MockChannel {
    pub fn new(id: &str) -> Arc<Self> {
        let (tx, _) = broadcast::channel(256);
        Arc::new(Self {
            id: id.to_string(),
            alive: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            interrupts: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            tx,
        })
    }

    /// Queue the output produced by the next write.
    pub fn reply(&self, chunks: &[&str]) {
        self.replies
            .lock()
            .push_back(chunks.iter().map(|c| c.to_string()).collect());
    }

    pub fn emit(&self, chunk: &str) {
        let _ = self.tx.send(ChannelEvent::Data(chunk.as_bytes().to_vec()));
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let _ = self.tx.send(ChannelEvent::Closed);
    }
}

#[async_trait]
impl ShellChannel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PilotError::ChannelWrite {
                message: "broken pipe".to_string(),
            });
        }
        self.writes
            .lock()
            .push(String::from_utf8_lossy(data).into_owned());
        let next = self.replies.lock().pop_front();
        for chunk in next.unwrap_or_default() {
            self.emit(&chunk);
        }
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }
}

/// Completion provider answering from queues, recording every request.
#[derive(Default)]
pub struct ScriptedProvider {
    proposals: Mutex<VecDeque<Result<Envelope>>>,
    fixes: Mutex<VecDeque<Result<Envelope>>>,
    interpretations: Mutex<VecDeque<Option<Interpretation>>>,
    pub goal_requests: Mutex<Vec<GoalRequest>>,
    pub fix_requests: Mutex<Vec<FixRequest>>,
    pub interpret_requests: Mutex<Vec<InterpretRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn propose(&self, envelope: Envelope) {
        self.proposals.lock().push_back(Ok(envelope));
    }

    pub fn fix(&self, envelope: Envelope) {
        self.fixes.lock().push_back(Ok(envelope));
    }

    pub fn fix_error(&self, err: PilotError) {
        self.fixes.lock().push_back(Err(err));
    }

    pub fn interpret(&self, interpretation: Option<Interpretation>) {
        self.interpretations.lock().push_back(interpretation);
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_requests.lock().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn propose(&self, request: &GoalRequest) -> Result<Envelope> {
        self.goal_requests.lock().push(request.clone());
        self.proposals
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(PilotError::Provider {
                message: "no scripted proposal".to_string(),
            }))
    }

    async fn fix(&self, request: &FixRequest) -> Result<Envelope> {
        self.fix_requests.lock().push(request.clone());
        self.fixes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(PilotError::Provider {
                message: "no scripted fix".to_string(),
            }))
    }

    async fn interpret(&self, request: &InterpretRequest) -> Result<Option<Interpretation>> {
        self.interpret_requests.lock().push(request.clone());
        Ok(self.interpretations.lock().pop_front().flatten())
    }
}

/// Approver with fixed answers that counts how often it was asked.
pub struct ScriptedApprover {
    pub approve_commands: bool,
    pub approve_plans: bool,
    pub step_decisions: Mutex<VecDeque<StepDecision>>,
    pub command_prompts: AtomicUsize,
    pub plan_prompts: AtomicUsize,
}

impl ScriptedApprover {
    pub fn new(approve: bool) -> Arc<Self> {
        Arc::new(Self {
            approve_commands: approve,
            approve_plans: approve,
            step_decisions: Mutex::new(VecDeque::new()),
            command_prompts: AtomicUsize::new(0),
            plan_prompts: AtomicUsize::new(0),
        })
    }

    pub fn on_failure(&self, decision: StepDecision) {
        self.step_decisions.lock().push_back(decision);
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn confirm_command(&self, _command: &str, _explanation: &str, _high_risk: bool) -> bool {
        self.command_prompts.fetch_add(1, Ordering::SeqCst);
        self.approve_commands
    }

    async fn confirm_plan(&self, _plan: &Plan) -> bool {
        self.plan_prompts.fetch_add(1, Ordering::SeqCst);
        self.approve_plans
    }

    async fn on_step_failure(&self, _plan: &Plan, _index: usize, _error: &str) -> StepDecision {
        self.step_decisions
            .lock()
            .pop_front()
            .unwrap_or(StepDecision::Stop)
    }
}
