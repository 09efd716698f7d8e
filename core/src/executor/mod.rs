//! Command execution controller
//!
//! Sends one command into a live [`Session`], follows the output stream until
//! the shell prompt returns, answers interactive prompts along the way and
//! classifies the result. Every execution resolves exactly once, whether by
//! prompt, timeout, cancellation, credential abort or transport failure.

pub mod safety;
pub mod timeout;

use crate::llm::prompts::{TRUNCATE_KEEP, TRUNCATE_THRESHOLD};
use crate::session::{BoundedBuffer, ChannelEvent, Session};
use crate::stream::interactive::{InteractiveResponder, ResponderAction, DEFAULT_MAX_INTERACTIVE_RESPONSES};
use crate::stream::sanitize::StreamDecoder;
use crate::stream::{classify, last_non_empty_line, looks_like_prompt, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

pub use safety::{CommandSafety, SafetyChecker};
pub use timeout::{TimeoutClass, TimeoutPolicy};

/// Error text for credential aborts.
pub const CREDENTIAL_ABORT_MESSAGE: &str = "Command requires authentication credentials (username/password/token) which cannot be provided automatically. The command was cancelled.";

/// An elevation password. Only the interactive responder ever reads it.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub command: String,
    pub secret: Option<Secret>,
    /// Overrides the keyword-derived timeout.
    pub timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            secret: None,
            timeout: None,
        }
    }

    pub fn with_secret(mut self, secret: Option<Secret>) -> Self {
        self.secret = secret;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    Success,
    Error,
    TimedOut,
    Cancelled,
    TransportError,
    CredentialRequired,
}

impl ExitClass {
    /// Outcomes that stop a retry loop instead of asking for a fix.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExitClass::TimedOut | ExitClass::Cancelled | ExitClass::TransportError
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub ok: bool,
    pub exit: ExitClass,
    pub raw_output: String,
    pub clean_output: String,
    pub timed_out: bool,
    pub error: Option<String>,
    pub verdict: Verdict,
    pub interactive_responses: usize,
    pub duration: Duration,
}

impl ExecutionResult {
    fn failed(command: &str, exit: ExitClass, error: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            ok: false,
            exit,
            raw_output: String::new(),
            clean_output: String::new(),
            timed_out: false,
            error: Some(error.into()),
            verdict: Verdict::default(),
            interactive_responses: 0,
            duration: Duration::ZERO,
        }
    }

    /// Sanitized output with the echoed command line removed.
    pub fn output_after_echo(&self) -> &str {
        output_after_echo(&self.clean_output, &self.command)
    }
}

/// Timing and budget knobs for the controller.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub timeouts: TimeoutPolicy,
    /// Delay before an interactive answer is written.
    pub reply_delay: Duration,
    /// Quiet period after the prompt returns before finalizing.
    pub settle_delay: Duration,
    /// Grace period after interrupting a credential prompt.
    pub credential_settle: Duration,
    pub max_interactive_responses: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeouts: TimeoutPolicy::default(),
            reply_delay: Duration::from_millis(100),
            settle_delay: Duration::from_millis(200),
            credential_settle: Duration::from_millis(500),
            max_interactive_responses: DEFAULT_MAX_INTERACTIVE_RESPONSES,
        }
    }
}

/// Resolution phase of a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Settling { at: Instant, reason: SettleReason },
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettleReason {
    Prompt,
    Credential,
}

/// Output text kept as a fixed head plus a sliding window, so a chatty
/// command costs bounded memory and each chunk a bounded scan.
struct CappedText {
    head: String,
    head_chars: usize,
    window: BoundedBuffer,
    total_chars: usize,
    total_bytes: usize,
}

impl CappedText {
    fn new() -> Self {
        Self {
            head: String::new(),
            head_chars: 0,
            window: BoundedBuffer::new(TRUNCATE_THRESHOLD),
            total_chars: 0,
            total_bytes: 0,
        }
    }

    fn push(&mut self, chunk: &str) {
        if self.head_chars < TRUNCATE_KEEP {
            let take: String = chunk.chars().take(TRUNCATE_KEEP - self.head_chars).collect();
            self.head_chars += take.chars().count();
            self.head.push_str(&take);
        }
        self.total_chars += chunk.chars().count();
        self.total_bytes += chunk.len();
        self.window.push(chunk);
    }

    fn window(&self) -> &str {
        self.window.as_str()
    }

    /// Bytes that have slid out of the window.
    fn dropped_bytes(&self) -> usize {
        self.total_bytes - self.window.as_str().len()
    }

    /// Everything when it fits, otherwise head and tail around a marker.
    fn into_text(self) -> String {
        if self.total_chars <= TRUNCATE_THRESHOLD {
            return self.window.as_str().to_string();
        }
        format!(
            "{}\n\n... [{} characters truncated] ...\n\n{}",
            self.head,
            self.total_chars - 2 * TRUNCATE_KEEP,
            self.window.tail(TRUNCATE_KEEP)
        )
    }
}

/// Accumulated output for one execution.
struct Capture {
    decoder: StreamDecoder,
    command: String,
    raw: CappedText,
    clean: CappedText,
    /// Byte offset in the clean stream just past the command echo.
    echo_end: Option<usize>,
}

impl Capture {
    fn new(command: &str) -> Self {
        Self {
            decoder: StreamDecoder::new(),
            command: command.to_string(),
            raw: CappedText::new(),
            clean: CappedText::new(),
            echo_end: None,
        }
    }

    fn push(&mut self, session: &Session, bytes: &[u8]) {
        let (raw, clean) = self.decoder.push(bytes);
        session.record_output(&raw, &clean);
        self.raw.push(&raw);
        self.clean.push(&clean);
        self.locate_echo();
    }

    fn finish(&mut self, session: &Session) {
        let tail = self.decoder.finish();
        if !tail.is_empty() {
            session.record_output("", &tail);
            self.clean.push(&tail);
            self.locate_echo();
        }
    }

    fn locate_echo(&mut self) {
        if self.echo_end.is_some() || self.command.is_empty() {
            return;
        }
        if let Some(idx) = self.clean.window().find(&self.command) {
            self.echo_end = Some(self.clean.dropped_bytes() + idx + self.command.len());
        }
    }

    /// Live window of clean output and its byte offset in the stream.
    fn window(&self) -> (&str, usize) {
        (self.clean.window(), self.clean.dropped_bytes())
    }

    /// Part of the live window that follows the command echo.
    fn after_echo(&self) -> &str {
        let (window, offset) = self.window();
        match self.echo_end {
            Some(end) => &window[end.saturating_sub(offset).min(window.len())..],
            None if offset == 0 => output_after_echo(window, &self.command),
            None => window,
        }
    }
}

pub struct CommandExecutor {
    settings: ExecutorSettings,
}

impl CommandExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run one command to completion. Never returns an error: every failure
    /// mode is reported through [`ExecutionResult::exit`].
    pub async fn execute(
        &self,
        session: &Session,
        request: ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let command = request.command.trim().to_string();
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.settings.timeouts.for_command(&command));

        if !session.is_alive() {
            return ExecutionResult::failed(&command, ExitClass::TransportError, "Not connected");
        }
        if cancel.is_cancelled() {
            return ExecutionResult::failed(&command, ExitClass::Cancelled, "Execution cancelled");
        }

        let channel = session.channel().clone();
        // Subscribe before writing so no output is missed
        let mut events = channel.subscribe();

        crate::debug_log!("[{}] exec (timeout {:?}): {}", session.id(), timeout, command);
        if let Err(e) = channel.write(format!("{}\n", command).as_bytes()).await {
            crate::error_log!("[{}] write failed: {}", session.id(), e);
            return ExecutionResult::failed(&command, ExitClass::TransportError, e.to_string());
        }

        let mut responder =
            InteractiveResponder::new(request.secret, self.settings.max_interactive_responses);
        let mut capture = Capture::new(&command);
        let mut replies: VecDeque<(Instant, Vec<u8>)> = VecDeque::new();
        let mut phase = Phase::Pending;
        let deadline = started + timeout;
        let far_future = deadline + Duration::from_secs(86_400);

        let mut exit = ExitClass::Success;
        let mut error: Option<String> = None;
        let mut timed_out = false;

        while phase != Phase::Resolved {
            let settle_at = match phase {
                Phase::Settling { at, .. } => Some(at),
                _ => None,
            };
            let reply_at = replies.front().map(|(at, _)| *at);

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    crate::info_log!("[{}] cancelled: {}", session.id(), command);
                    if let Err(e) = channel.interrupt().await {
                        crate::warn_log!("[{}] interrupt failed: {}", session.id(), e);
                    }
                    exit = ExitClass::Cancelled;
                    error = Some("Execution cancelled".to_string());
                    phase = Phase::Resolved;
                }

                _ = sleep_until(deadline) => {
                    crate::warn_log!("[{}] timed out after {:?}: {}", session.id(), timeout, command);
                    exit = ExitClass::TimedOut;
                    timed_out = true;
                    error = Some(format!(
                        "Command timed out after {}s; it may still be running on the remote side",
                        timeout.as_secs()
                    ));
                    phase = Phase::Resolved;
                }

                _ = sleep_until(settle_at.unwrap_or(far_future)), if settle_at.is_some() => {
                    if let Phase::Settling { reason, .. } = phase {
                        match reason {
                            SettleReason::Prompt => exit = ExitClass::Success,
                            SettleReason::Credential => {
                                exit = ExitClass::CredentialRequired;
                                error = Some(CREDENTIAL_ABORT_MESSAGE.to_string());
                            }
                        }
                    }
                    phase = Phase::Resolved;
                }

                _ = sleep_until(reply_at.unwrap_or(far_future)), if reply_at.is_some() => {
                    if let Some((_, bytes)) = replies.pop_front() {
                        if let Err(e) = channel.write(&bytes).await {
                            crate::error_log!("[{}] reply write failed: {}", session.id(), e);
                            exit = ExitClass::TransportError;
                            error = Some(e.to_string());
                            phase = Phase::Resolved;
                        }
                    }
                }

                event = events.recv() => match event {
                    Ok(ChannelEvent::Data(bytes)) => {
                        capture.push(session, &bytes);
                        if phase == Phase::Pending {
                            phase = self.on_output(session, &capture, &mut responder, &mut replies).await;
                        }
                    }
                    Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => {
                        crate::warn_log!("[{}] channel closed during: {}", session.id(), command);
                        exit = ExitClass::TransportError;
                        error = Some("Shell channel closed".to_string());
                        phase = Phase::Resolved;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        crate::warn_log!("[{}] output lagged, {} chunks dropped", session.id(), skipped);
                    }
                },
            }
        }

        // Releases the subscription
        drop(events);
        capture.finish(session);

        let verdict = classify(capture.after_echo());
        if exit == ExitClass::Success && verdict.is_error {
            exit = ExitClass::Error;
        }

        let result = ExecutionResult {
            ok: exit == ExitClass::Success,
            exit,
            raw_output: capture.raw.into_text(),
            clean_output: capture.clean.into_text(),
            timed_out,
            error,
            verdict,
            interactive_responses: responder.budget().used(),
            duration: started.elapsed(),
            command,
        };
        crate::debug_log!(
            "[{}] resolved {:?} (error score {}, success score {}, {} replies) in {:?}",
            session.id(),
            result.exit,
            result.verdict.error_score,
            result.verdict.success_score,
            result.interactive_responses,
            result.duration
        );
        result
    }

    /// Handle new output while still pending. Returns the next phase.
    async fn on_output(
        &self,
        session: &Session,
        capture: &Capture,
        responder: &mut InteractiveResponder,
        replies: &mut VecDeque<(Instant, Vec<u8>)>,
    ) -> Phase {
        let (window, offset) = capture.window();
        match responder.inspect_window(window, offset) {
            ResponderAction::Reply { bytes, .. } => {
                replies.push_back((Instant::now() + self.settings.reply_delay, bytes));
                return Phase::Pending;
            }
            ResponderAction::AbortCredential => {
                if let Err(e) = session.channel().interrupt().await {
                    crate::warn_log!("[{}] interrupt failed: {}", session.id(), e);
                }
                return Phase::Settling {
                    at: Instant::now() + self.settings.credential_settle,
                    reason: SettleReason::Credential,
                };
            }
            ResponderAction::Pass => {}
        }

        if looks_like_prompt(last_non_empty_line(window)) && !capture.after_echo().trim().is_empty()
        {
            return Phase::Settling {
                at: Instant::now() + self.settings.settle_delay,
                reason: SettleReason::Prompt,
            };
        }
        Phase::Pending
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(ExecutorSettings::default())
    }
}

/// Text following the echoed command line. Falls back to skipping as many
/// characters as the command plus newline when the echo is not found.
pub fn output_after_echo<'a>(clean: &'a str, command: &str) -> &'a str {
    if !command.is_empty() {
        if let Some(idx) = clean.find(command) {
            return &clean[idx + command.len()..];
        }
    }
    let skip = command.chars().count() + 1;
    match clean.char_indices().nth(skip) {
        Some((idx, _)) => &clean[idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;
    use std::sync::Arc;

    const PROMPT: &str = "user@host:~$ ";

    fn session_with(channel: &Arc<MockChannel>) -> Session {
        Session::new(channel.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_hi() {
        let channel = MockChannel::new("s1");
        channel.reply(&["user@host:~$ echo hi\r\n", "hi\r\n", PROMPT]);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(&session, ExecutionRequest::new("echo hi"), &CancellationToken::new())
            .await;

        assert!(result.ok, "{:?}", result);
        assert_eq!(result.exit, ExitClass::Success);
        assert!(result.clean_output.contains("hi"));
        assert!(!result.timed_out);
        assert_eq!(channel.writes(), vec!["echo hi\n".to_string()]);
        assert_eq!(channel.subscriber_count(), 0);
        assert!(session.clean_output().contains("hi\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apt_failure_is_error() {
        let channel = MockChannel::new("s1");
        channel.reply(&[
            "sudo apt-get install -y foo\r\n",
            "Reading package lists... \r\n",
            "E: Unable to locate package foo\r\n",
            PROMPT,
        ]);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(
                &session,
                ExecutionRequest::new("sudo apt-get install -y foo"),
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.ok);
        assert_eq!(result.exit, ExitClass::Error);
        assert!(result.verdict.error_score >= 3);
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_output_keeps_head_and_tail() {
        let channel = MockChannel::new("s1");
        let body: String = (0..3000).map(|i| format!("line {}\r\n", i)).collect();
        channel.reply(&["cat big.log\r\n", body.as_str(), PROMPT]);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(&session, ExecutionRequest::new("cat big.log"), &CancellationToken::new())
            .await;

        assert!(result.ok, "{:?}", result.exit);
        assert!(result.clean_output.chars().count() <= TRUNCATE_THRESHOLD);
        assert!(result.raw_output.chars().count() <= TRUNCATE_THRESHOLD);
        assert!(result.clean_output.contains("characters truncated"));
        assert!(result.clean_output.contains("line 0\n"));
        assert!(result.clean_output.contains("line 2999\n"));
        assert!(!result.clean_output.contains("line 1500\n"));
        assert!(result.output_after_echo().trim_start().starts_with("line 0"));
    }

    #[test]
    fn test_capped_text_window_offset() {
        let mut text = CappedText::new();
        text.push(&"a".repeat(TRUNCATE_THRESHOLD));
        assert_eq!(text.dropped_bytes(), 0);
        text.push("bcd");
        assert_eq!(text.dropped_bytes(), 3);
        assert!(text.window().ends_with("bcd"));
        assert_eq!(text.window().chars().count(), TRUNCATE_THRESHOLD);

        let out = text.into_text();
        assert!(out.starts_with(&"a".repeat(TRUNCATE_KEEP)));
        assert!(out.ends_with("bcd"));
        assert!(out.contains(&format!("[{} characters truncated]", TRUNCATE_THRESHOLD + 3 - 2 * TRUNCATE_KEEP)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sudo_password_injected_once() {
        let channel = MockChannel::new("s1");
        channel.reply(&["sudo whoami\r\n", "[sudo] password for bob: "]);
        channel.reply(&["\r\nroot\r\n", PROMPT]);
        let session = session_with(&channel);

        let request = ExecutionRequest::new("sudo whoami").with_secret(Some(Secret::new("hunter2")));
        let result = CommandExecutor::default()
            .execute(&session, request, &CancellationToken::new())
            .await;

        assert!(result.ok, "{:?}", result);
        assert_eq!(result.interactive_responses, 1);
        assert_eq!(
            channel.writes(),
            vec!["sudo whoami\n".to_string(), "hunter2\n".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_answered() {
        let channel = MockChannel::new("s1");
        channel.reply(&["sudo apt-get remove nano\r\n", "Do you want to continue? [Y/n] "]);
        channel.reply(&["y\r\nRemoving nano ...\r\n", PROMPT]);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(
                &session,
                ExecutionRequest::new("sudo apt-get remove nano"),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.ok, "{:?}", result);
        assert_eq!(channel.writes()[1], "y\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_prompt_aborts() {
        let channel = MockChannel::new("s1");
        channel.reply(&[
            "git clone https://example.com/private.git\r\n",
            "Cloning into 'private'...\r\n",
            "Username for 'https://example.com': ",
        ]);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(
                &session,
                ExecutionRequest::new("git clone https://example.com/private.git")
                    .with_secret(Some(Secret::new("hunter2"))),
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.ok);
        assert_eq!(result.exit, ExitClass::CredentialRequired);
        assert_eq!(result.error.as_deref(), Some(CREDENTIAL_ABORT_MESSAGE));
        assert_eq!(result.interactive_responses, 0);
        assert_eq!(channel.interrupts(), 1);
        assert!(!channel.writes().iter().any(|w| w.contains("hunter2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial_output() {
        let channel = MockChannel::new("s1");
        channel.reply(&["sleep 999\r\n", "still going"]);
        let session = session_with(&channel);

        let request = ExecutionRequest::new("sleep 999").with_timeout(Duration::from_secs(5));
        let result = CommandExecutor::default()
            .execute(&session, request, &CancellationToken::new())
            .await;

        assert!(!result.ok);
        assert!(result.timed_out);
        assert_eq!(result.exit, ExitClass::TimedOut);
        assert!(result.clean_output.contains("still going"));
        assert!(result.error.unwrap().contains("still be running"));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts() {
        let channel = MockChannel::new("s1");
        channel.reply(&["tail -f /var/log/syslog\r\n", "line\r\n"]);
        let session = session_with(&channel);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = CommandExecutor::default()
            .execute(&session, ExecutionRequest::new("tail -f /var/log/syslog"), &cancel)
            .await;

        assert_eq!(result.exit, ExitClass::Cancelled);
        assert!(!result.ok);
        assert_eq!(channel.interrupts(), 1);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_transport_error() {
        let channel = MockChannel::new("s1");
        channel.fail_writes(true);
        let session = session_with(&channel);

        let result = CommandExecutor::default()
            .execute(&session, ExecutionRequest::new("uptime"), &CancellationToken::new())
            .await;

        assert_eq!(result.exit, ExitClass::TransportError);
        assert!(!result.ok);
        assert!(result.error.is_some());
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_inside_output_does_not_finish_early() {
        let channel = MockChannel::new("s1");
        channel.reply(&["cat motd\r\n", "user@host:~$ is how prompts look\r\n", "more\r\n"]);
        let session = session_with(&channel);

        let request = ExecutionRequest::new("cat motd").with_timeout(Duration::from_secs(3));
        let result = CommandExecutor::default()
            .execute(&session, request, &CancellationToken::new())
            .await;

        assert!(result.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_caps_auto_answers() {
        let channel = MockChannel::new("s1");
        channel.reply(&["./setup.sh\r\n", "Proceed? "]);
        for i in 0..10 {
            channel.reply(&[&format!("\r\nstep {}\r\nProceed? ", i)]);
        }
        let session = session_with(&channel);

        let settings = ExecutorSettings {
            max_interactive_responses: 3,
            ..ExecutorSettings::default()
        };
        let request = ExecutionRequest::new("./setup.sh").with_timeout(Duration::from_secs(10));
        let result = CommandExecutor::new(settings)
            .execute(&session, request, &CancellationToken::new())
            .await;

        assert_eq!(result.interactive_responses, 3);
        assert_eq!(channel.writes().len(), 4);
        assert!(result.timed_out);
    }

    #[test]
    fn test_output_after_echo() {
        assert_eq!(output_after_echo("$ echo hi\nhi\n", "echo hi"), "\nhi\n");
        assert_eq!(output_after_echo("abcdef", "xyz"), "ef");
        assert_eq!(output_after_echo("ab", "xyz"), "");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let request = ExecutionRequest::new("sudo true").with_secret(Some(Secret::new("hunter2")));
        let debug = format!("{:?}", request);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Secret(***)"));
    }
}
