//! Interactive prompt responder
//!
//! Watches the tail of a running command's output for secondary prompts
//! (sudo password, confirmations, pagers, dpkg dialogs) and decides which
//! canned reply to inject. Credential prompts for remote services are never
//! answered: they abort the execution instead.

use crate::executor::Secret;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters of trailing output inspected on every chunk.
pub const PROMPT_WINDOW_CHARS: usize = 500;

/// Default cap on automatic answers per execution.
pub const DEFAULT_MAX_INTERACTIVE_RESPONSES: usize = 5;

/// Kinds of secondary prompt the responder recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    /// Remote credentials (git/HTTP auth, API tokens). Never answered.
    Credential,
    /// Local elevation password, answered with the request secret.
    Secret,
    Confirm,
    PressEnter,
    PackageDialog,
    Overwrite,
}

impl PromptCategory {
    /// Canned reply for this category, `None` when it must not be answered.
    fn reply(self, secret: Option<&Secret>) -> Option<Vec<u8>> {
        match self {
            PromptCategory::Credential => None,
            PromptCategory::Secret => secret.map(|s| format!("{}\n", s.expose()).into_bytes()),
            PromptCategory::Confirm | PromptCategory::Overwrite => Some(b"y\n".to_vec()),
            PromptCategory::PressEnter => Some(b"\n".to_vec()),
            // Keep the locally modified config file
            PromptCategory::PackageDialog => Some(b"N\n".to_vec()),
        }
    }
}

struct InteractiveRule {
    category: PromptCategory,
    pattern: Regex,
}

impl InteractiveRule {
    fn new(category: PromptCategory, pattern: &str) -> Self {
        Self {
            category,
            pattern: Regex::new(pattern).expect("valid interactive regex"),
        }
    }
}

lazy_static! {
    /// Checked in order. Credential comes first so nothing else can answer it.
    static ref INTERACTIVE_RULES: Vec<InteractiveRule> = vec![
        InteractiveRule::new(
            PromptCategory::Credential,
            r#"(?im)Username for ['"]https?://|Password for ['"]https?://|Token for ['"]https?://|Enter your .*(?:username|credentials|token|API key)"#,
        ),
        InteractiveRule::new(
            PromptCategory::Secret,
            r"(?im)\[sudo\] password for \S+:|Password:\s*$",
        ),
        InteractiveRule::new(
            PromptCategory::Confirm,
            r"(?im)\(y/n\)|\[y/N\]|\[Y/n\]|\(yes/no(?:/\[fingerprint\])?\)|Do you want to continue\s*\?|Are you sure.*\?|Proceed\s*\?|Continue\s*\?|is that correct\s*\?|\bconfirm\b.*\?|(?:restart|reload).*(?:service|daemon).*\?",
        ),
        InteractiveRule::new(
            PromptCategory::PressEnter,
            r"(?im)Press (?:ENTER|RETURN|any key)|Hit (?:enter|return)",
        ),
        InteractiveRule::new(
            PromptCategory::PackageDialog,
            r"(?im)What would you like to do about it|keep the local version|install the package maintainer",
        ),
        InteractiveRule::new(
            PromptCategory::Overwrite,
            r"(?im)(?:overwrite|replace|already exists).*\?",
        ),
    ];
}

/// Per-execution cap on injected answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractiveBudget {
    max: usize,
    used: usize,
}

impl InteractiveBudget {
    pub fn new(max: usize) -> Self {
        Self { max, used: 0 }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.max.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    fn try_consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }
}

impl Default for InteractiveBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERACTIVE_RESPONSES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    Responded(usize),
    Exhausted,
    CredentialAbort,
}

/// What the controller should do with the current chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponderAction {
    /// Inject `bytes` after the settle delay. The chunk is consumed.
    Reply { category: PromptCategory, bytes: Vec<u8> },
    /// A credential prompt appeared: interrupt and resolve with an error.
    AbortCredential,
    /// Nothing to answer; continue with completion detection.
    Pass,
}

/// Secondary prompt state machine for a single execution.
pub struct InteractiveResponder {
    secret: Option<Secret>,
    budget: InteractiveBudget,
    state: ResponderState,
    secret_sent: bool,
    /// Byte offset in the execution output up to which prompts have been handled.
    answered_through: usize,
    warned_missing_secret: bool,
}

impl InteractiveResponder {
    pub fn new(secret: Option<Secret>, max_responses: usize) -> Self {
        Self {
            secret,
            budget: InteractiveBudget::new(max_responses),
            state: ResponderState::Idle,
            secret_sent: false,
            answered_through: 0,
            warned_missing_secret: false,
        }
    }

    pub fn state(&self) -> ResponderState {
        self.state
    }

    pub fn budget(&self) -> InteractiveBudget {
        self.budget
    }

    /// Inspect the full sanitized output of the current execution.
    pub fn inspect(&mut self, output: &str) -> ResponderAction {
        self.inspect_window(output, 0)
    }

    /// Inspect a tail of the output that begins `offset` bytes into the
    /// execution's sanitized stream.
    pub fn inspect_window(&mut self, output: &str, offset: usize) -> ResponderAction {
        if self.state == ResponderState::CredentialAbort {
            return ResponderAction::Pass;
        }

        let window_start = tail_start(output, PROMPT_WINDOW_CHARS);
        let window = &output[window_start..];

        for rule in INTERACTIVE_RULES.iter() {
            let Some(found) = rule.pattern.find_iter(window).last() else {
                continue;
            };
            let end = offset + window_start + found.end();

            if rule.category == PromptCategory::Credential {
                crate::warn_log!("Credential prompt detected, aborting: {:?}", found.as_str());
                self.state = ResponderState::CredentialAbort;
                return ResponderAction::AbortCredential;
            }

            if end <= self.answered_through {
                continue;
            }

            if self.budget.is_exhausted() {
                if self.state != ResponderState::Exhausted {
                    crate::warn_log!(
                        "Interactive response budget exhausted ({}), leaving {:?} prompt unanswered",
                        self.budget.used(),
                        rule.category
                    );
                }
                self.state = ResponderState::Exhausted;
                return ResponderAction::Pass;
            }

            if rule.category == PromptCategory::Secret {
                if self.secret_sent {
                    // A second password prompt means the secret was rejected
                    continue;
                }
                if self.secret.is_none() {
                    if !self.warned_missing_secret {
                        crate::debug_log!("Password prompt seen but no secret was supplied");
                        self.warned_missing_secret = true;
                    }
                    continue;
                }
            }

            let Some(bytes) = rule.category.reply(self.secret.as_ref()) else {
                continue;
            };
            if !self.budget.try_consume() {
                continue;
            }

            if rule.category == PromptCategory::Secret {
                self.secret_sent = true;
            }
            self.answered_through = end;
            self.state = ResponderState::Responded(self.budget.used());
            crate::debug_log!(
                "Answering {:?} prompt ({}/{} responses used)",
                rule.category,
                self.budget.used(),
                self.budget.used() + self.budget.remaining()
            );
            return ResponderAction::Reply {
                category: rule.category,
                bytes,
            };
        }

        ResponderAction::Pass
    }
}

/// Byte index where the last `max_chars` characters of `text` begin.
fn tail_start(text: &str, max_chars: usize) -> usize {
    text.char_indices()
        .rev()
        .nth(max_chars.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder(secret: Option<&str>) -> InteractiveResponder {
        InteractiveResponder::new(secret.map(Secret::new), DEFAULT_MAX_INTERACTIVE_RESPONSES)
    }

    #[test]
    fn test_sudo_prompt_answered_once() {
        let mut r = responder(Some("hunter2"));
        let mut output = String::from("sudo apt-get update\n[sudo] password for bob: ");

        let action = r.inspect(&output);
        assert_eq!(
            action,
            ResponderAction::Reply {
                category: PromptCategory::Secret,
                bytes: b"hunter2\n".to_vec()
            }
        );
        assert_eq!(r.budget().used(), 1);

        // Same literal prompt still inside the window on the next chunk
        output.push('\n');
        assert_eq!(r.inspect(&output), ResponderAction::Pass);
        assert_eq!(r.budget().used(), 1);
    }

    #[test]
    fn test_sudo_reprompt_is_not_answered() {
        let mut r = responder(Some("wrong"));
        let mut output = String::from("[sudo] password for bob: ");
        assert!(matches!(r.inspect(&output), ResponderAction::Reply { .. }));

        output.push_str("\nSorry, try again.\n[sudo] password for bob: ");
        assert_eq!(r.inspect(&output), ResponderAction::Pass);
        assert_eq!(r.budget().used(), 1);
    }

    #[test]
    fn test_password_prompt_without_secret_passes() {
        let mut r = responder(None);
        assert_eq!(r.inspect("[sudo] password for bob: "), ResponderAction::Pass);
        assert_eq!(r.budget().used(), 0);
    }

    #[test]
    fn test_confirmation_answered_per_occurrence() {
        let mut r = responder(None);
        let mut output = String::from("Do you want to continue? [Y/n] ");
        assert!(matches!(
            r.inspect(&output),
            ResponderAction::Reply { category: PromptCategory::Confirm, .. }
        ));

        output.push_str("y\nUnpacking...\n");
        assert_eq!(r.inspect(&output), ResponderAction::Pass);

        output.push_str("Restart services during package upgrades without asking? [y/N] ");
        assert!(matches!(
            r.inspect(&output),
            ResponderAction::Reply { category: PromptCategory::Confirm, .. }
        ));
        assert_eq!(r.budget().used(), 2);
    }

    #[test]
    fn test_answered_prompt_stays_answered_as_window_slides() {
        let mut r = responder(None);
        let output = "Unpacking...\nDo you want to continue? [Y/n] ";
        assert!(matches!(r.inspect_window(output, 0), ResponderAction::Reply { .. }));

        // The first line has been dropped from the front of the window
        let slid = &output["Unpacking...\n".len()..];
        assert_eq!(r.inspect_window(slid, "Unpacking...\n".len()), ResponderAction::Pass);
        assert_eq!(r.budget().used(), 1);
    }

    #[test]
    fn test_overlapping_categories_answer_once() {
        let mut r = responder(None);
        let output = "cp: overwrite 'a.txt'? (y/n) ";
        assert!(matches!(r.inspect(output), ResponderAction::Reply { .. }));
        assert_eq!(r.inspect(output), ResponderAction::Pass);
        assert_eq!(r.budget().used(), 1);
    }

    #[test]
    fn test_dpkg_and_press_enter_replies() {
        let mut r = responder(None);
        assert_eq!(
            r.inspect("*** config (Y/I/N/O/D/Z) What would you like to do about it ?"),
            ResponderAction::Reply {
                category: PromptCategory::PackageDialog,
                bytes: b"N\n".to_vec()
            }
        );

        let mut r = responder(None);
        assert_eq!(
            r.inspect("Press ENTER to continue"),
            ResponderAction::Reply {
                category: PromptCategory::PressEnter,
                bytes: b"\n".to_vec()
            }
        );
    }

    #[test]
    fn test_budget_caps_responses() {
        let mut r = InteractiveResponder::new(None, 2);
        let mut output = String::new();
        let mut replies = 0;
        for i in 0..6 {
            output.push_str(&format!("step {} Proceed? ", i));
            if matches!(r.inspect(&output), ResponderAction::Reply { .. }) {
                replies += 1;
            }
            output.push('\n');
        }
        assert_eq!(replies, 2);
        assert_eq!(r.state(), ResponderState::Exhausted);
    }

    #[test]
    fn test_credential_prompt_never_answered() {
        let mut r = responder(Some("hunter2"));
        let output = "git clone https://example.com/repo.git\nUsername for 'https://example.com': ";
        assert_eq!(r.inspect(output), ResponderAction::AbortCredential);
        assert_eq!(r.budget().used(), 0);
        assert_eq!(r.state(), ResponderState::CredentialAbort);
        assert_eq!(r.inspect(output), ResponderAction::Pass);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut r = responder(None);
        let mut output = String::from("Proceed? ");
        output.push_str(&"x".repeat(PROMPT_WINDOW_CHARS + 10));
        assert_eq!(r.inspect(&output), ResponderAction::Pass);
    }

    #[test]
    fn test_tail_start_is_char_boundary() {
        let text = "ééééé";
        let start = tail_start(text, 2);
        assert_eq!(&text[start..], "éé");
        assert_eq!(tail_start("ab", 10), 0);
    }
}
