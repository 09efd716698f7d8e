//! Heuristics over the unframed terminal stream.
//!
//! Everything here is synchronous and side-effect free so each rule table can
//! be tested on its own.

pub mod classify;
pub mod interactive;
pub mod prompt;
pub mod sanitize;

pub use classify::{classify, Verdict, ERROR_THRESHOLD};
pub use interactive::{
    InteractiveBudget, InteractiveResponder, PromptCategory, ResponderAction, ResponderState,
};
pub use prompt::looks_like_prompt;
pub use sanitize::{last_non_empty_line, sanitize_command, strip_ansi, strip_ansi_bytes};
