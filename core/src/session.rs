//! Shell sessions
//!
//! A [`Session`] wraps a transport-owned [`ShellChannel`] together with the
//! bounded output windows and conversation history the orchestrator feeds to
//! the completion provider.

use crate::context::EnvironmentFacts;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default size of the raw and sanitized output windows, in characters.
pub const DEFAULT_WINDOW_CHARS: usize = 12_000;

/// Conversation lines kept per session.
pub const HISTORY_LIMIT: usize = 40;

/// Interrupt byte (Ctrl+C).
pub const INTERRUPT: u8 = 0x03;

/// Event published by a shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Raw bytes read from the terminal.
    Data(Vec<u8>),
    /// The remote side closed the stream.
    Closed,
}

/// An open, interactive shell stream.
///
/// Implementations own the connection. Subscribers receive every chunk
/// published after `subscribe` returns; dropping the receiver unsubscribes.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    fn id(&self) -> &str;

    fn is_alive(&self) -> bool;

    async fn write(&self, data: &[u8]) -> Result<()>;

    async fn interrupt(&self) -> Result<()> {
        self.write(&[INTERRUPT]).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}

/// Text window that keeps only the most recent `max_chars` characters.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    text: String,
    max_chars: usize,
}

impl BoundedBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        let count = self.text.chars().count();
        if count > self.max_chars {
            let cut = self
                .text
                .char_indices()
                .nth(count - self.max_chars)
                .map(|(idx, _)| idx)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Last `n` characters of the window.
    pub fn tail(&self, n: usize) -> &str {
        let start = self
            .text
            .char_indices()
            .rev()
            .nth(n.saturating_sub(1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        if n == 0 {
            return "";
        }
        &self.text[start..]
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A live shell plus the state shellpilot keeps about it.
pub struct Session {
    channel: Arc<dyn ShellChannel>,
    raw: Mutex<BoundedBuffer>,
    clean: Mutex<BoundedBuffer>,
    history: Mutex<VecDeque<String>>,
    environment: Mutex<Option<EnvironmentFacts>>,
}

impl Session {
    pub fn new(channel: Arc<dyn ShellChannel>) -> Self {
        Self::with_window(channel, DEFAULT_WINDOW_CHARS)
    }

    pub fn with_window(channel: Arc<dyn ShellChannel>, window_chars: usize) -> Self {
        Self {
            channel,
            raw: Mutex::new(BoundedBuffer::new(window_chars)),
            clean: Mutex::new(BoundedBuffer::new(window_chars)),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            environment: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        self.channel.id()
    }

    pub fn is_alive(&self) -> bool {
        self.channel.is_alive()
    }

    pub fn channel(&self) -> &Arc<dyn ShellChannel> {
        &self.channel
    }

    /// Append a chunk to both output windows.
    pub(crate) fn record_output(&self, raw: &str, clean: &str) {
        self.raw.lock().push(raw);
        self.clean.lock().push(clean);
    }

    pub fn raw_output(&self) -> String {
        self.raw.lock().as_str().to_string()
    }

    pub fn clean_output(&self) -> String {
        self.clean.lock().as_str().to_string()
    }

    /// Last `chars` characters of sanitized output.
    pub fn recent_output(&self, chars: usize) -> String {
        self.clean.lock().tail(chars).to_string()
    }

    pub fn clear_output(&self) {
        self.raw.lock().clear();
        self.clean.lock().clear();
    }

    pub fn push_history(&self, line: impl Into<String>) {
        let mut history = self.history.lock();
        if history.len() >= HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(line.into());
    }

    /// Most recent `n` history lines, oldest first.
    pub fn recent_history(&self, n: usize) -> Vec<String> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn environment(&self) -> Option<EnvironmentFacts> {
        self.environment.lock().clone()
    }

    pub fn set_environment(&self, facts: EnvironmentFacts) {
        *self.environment.lock() = Some(facts);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;

    #[test]
    fn test_bounded_buffer_keeps_tail() {
        let mut buf = BoundedBuffer::new(5);
        buf.push("abc");
        buf.push("defg");
        assert_eq!(buf.as_str(), "cdefg");
        assert_eq!(buf.tail(2), "fg");
        assert_eq!(buf.tail(0), "");
        assert_eq!(buf.tail(99), "cdefg");
    }

    #[test]
    fn test_bounded_buffer_multibyte() {
        let mut buf = BoundedBuffer::new(3);
        buf.push("héllo✓");
        assert_eq!(buf.as_str(), "lo✓");
    }

    #[test]
    fn test_history_is_bounded() {
        let session = Session::new(MockChannel::new("s1"));
        for i in 0..(HISTORY_LIMIT + 5) {
            session.push_history(format!("line {}", i));
        }
        let recent = session.recent_history(3);
        assert_eq!(
            recent,
            vec![
                format!("line {}", HISTORY_LIMIT + 2),
                format!("line {}", HISTORY_LIMIT + 3),
                format!("line {}", HISTORY_LIMIT + 4),
            ]
        );
        assert_eq!(session.recent_history(1000).len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_record_output_window() {
        let session = Session::with_window(MockChannel::new("s1"), 4);
        session.record_output("\x1b[1mab\x1b[0m", "ab");
        session.record_output("cdef", "cdef");
        assert_eq!(session.clean_output(), "cdef");
        assert_eq!(session.recent_output(2), "ef");
        assert_eq!(session.id(), "s1");
    }
}
