//! Shell prompt detection
//!
//! Decides whether the trailing line of sanitized output is a shell waiting
//! for input. Only the trailing line is ever inspected so prompt-like text
//! inside program output cannot end a command early.

use lazy_static::lazy_static;
use regex::Regex;

/// A single named prompt pattern.
pub struct PromptRule {
    pub name: &'static str,
    pub pattern: Regex,
}

impl PromptRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("valid prompt regex"),
        }
    }
}

lazy_static! {
    /// Ordered prompt rules. First match wins.
    pub static ref PROMPT_RULES: Vec<PromptRule> = vec![
        PromptRule::new("bracketed", r"\[.*@.*\][#$%>]\s*$"),
        PromptRule::new("user_host_path", r"\S+@\S+[:~][^\n]*[#$%>]\s*$"),
        PromptRule::new("debian_style", r"^[^@\n]+@[^:]+:[^$#]*[#$]\s*$"),
        PromptRule::new("root", r"^root@[^\s]+[:#][^\n]*[#$]\s*$"),
        PromptRule::new("minimal_user_host", r"^\w+@\w+[:\s~]*[$#%>]\s*$"),
        PromptRule::new("versioned_shell", r"^(?:bash|sh|zsh)-[\d.]+[#$%>]\s*$"),
        PromptRule::new("virtualenv", r"^\([\w-]+\)\s*\S+@\S+"),
        PromptRule::new("oh_my_zsh_arrow", r"^➜\s"),
        PromptRule::new("themed_glyph", r"^\S+\s*[❯›▶]\s*$"),
        PromptRule::new("localhost", r"^localhost[:#~][^\n]*[#$]\s*$"),
    ];
}

/// Name of the first rule matching `line`, if any.
pub fn matching_rule(line: &str) -> Option<&'static str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    PROMPT_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(trimmed))
        .map(|rule| rule.name)
}

/// Whether a sanitized line looks like a shell prompt awaiting input.
pub fn looks_like_prompt(line: &str) -> bool {
    matching_rule(line).is_some()
}
