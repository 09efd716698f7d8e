//! Local terminal plumbing: the PTY-backed shell channel and interactive prompts.

pub mod approval;
pub mod pty;

pub use approval::TerminalApprover;
pub use pty::PtyChannel;
