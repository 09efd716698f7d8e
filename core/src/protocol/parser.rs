//! Provider response parser
//!
//! Models wrap JSON in code fences, surround it with prose, or put literal
//! newlines inside string values. Parsing tries fenced blocks, the whole
//! text, then balanced `{...}` candidates. When no usable envelope is found
//! the text is treated as a bare command.

use super::{Confidence, Envelope, EstimatedTime, Interpretation, Risk};
use crate::error::{PilotError, Result};
use crate::stream::sanitize_command;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref END_FENCE: Regex = Regex::new(r"(?m)^[ \t]*```[ \t]*$").expect("valid regex");
    static ref FAILURE_TEXT: Regex =
        Regex::new(r"(?i)^(?:FAILED|ERROR|The command failed)").expect("valid regex");
}

/// Which call produced the response; selects defaults and the fallback variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseContext {
    Propose,
    Fix,
}

/// Parse a propose/fix response into an envelope with defaults applied.
///
/// Fails only when the text holds neither a known envelope nor anything
/// usable as a command.
pub fn parse_envelope(text: &str, context: ResponseContext) -> Result<Envelope> {
    if let Some(envelope) = find_json(text, |candidate| {
        serde_json::from_str::<Envelope>(candidate).ok()
    }) {
        return Ok(normalize(envelope, text, context));
    }

    let command = sanitize_command(text);
    if command.is_empty() {
        return Err(PilotError::UnusableResponse {
            reason: "provider returned no usable command".to_string(),
        });
    }

    crate::debug_log!("No envelope in provider response, using raw text as command");
    Ok(match context {
        ResponseContext::Propose => Envelope::Command {
            command,
            explanation: String::new(),
            risk: Risk::Low,
            estimated_time: EstimatedTime::Fast,
        },
        ResponseContext::Fix => Envelope::Fix {
            command,
            explanation: String::new(),
            confidence: Confidence::Low,
        },
    })
}

/// Parse an interpretation, falling back to a prefix heuristic on plain text.
pub fn parse_interpretation(text: &str) -> Interpretation {
    if let Some(mut interp) = find_json(text, |candidate| {
        serde_json::from_str::<Interpretation>(candidate).ok()
    }) {
        if interp.answer.is_empty() {
            interp.answer = text.trim().to_string();
        }
        if interp.success {
            interp.permanent_failure = false;
            interp.failure_category = None;
        }
        return interp;
    }

    let trimmed = text.trim();
    Interpretation {
        success: !FAILURE_TEXT.is_match(trimmed),
        answer: trimmed.to_string(),
        permanent_failure: false,
        failure_category: None,
    }
}

fn normalize(envelope: Envelope, raw: &str, context: ResponseContext) -> Envelope {
    match envelope {
        Envelope::Command {
            command,
            explanation,
            risk,
            estimated_time,
        } => Envelope::Command {
            command: sanitize_command(&command),
            explanation,
            risk,
            estimated_time,
        },
        Envelope::Fix {
            command,
            explanation,
            confidence,
        } => Envelope::Fix {
            command: sanitize_command(&command),
            explanation,
            confidence,
        },
        Envelope::Plan(mut plan) => {
            if plan.title.trim().is_empty() {
                plan.title = match context {
                    ResponseContext::Propose => "Execution Plan",
                    ResponseContext::Fix => "Fix Plan",
                }
                .to_string();
            }
            for step in &mut plan.steps {
                step.command = sanitize_command(&step.command);
            }
            Envelope::Plan(plan)
        }
        Envelope::Info { answer } if answer.trim().is_empty() => Envelope::Info {
            answer: raw.trim().to_string(),
        },
        Envelope::Impossible { reason, suggestion } => Envelope::Impossible {
            reason: non_empty(reason, "This operation cannot be performed on this system."),
            suggestion: suggestion.filter(|s| !s.trim().is_empty()),
        },
        Envelope::Clarification { question, options } => Envelope::Clarification {
            question: non_empty(question, "Could you provide more details?"),
            options,
        },
        Envelope::Abort {
            reason,
            root_cause,
            suggestion,
        } => Envelope::Abort {
            reason: non_empty(reason, "This task cannot be completed."),
            root_cause: non_empty(root_cause, "unknown"),
            suggestion: suggestion.filter(|s| !s.trim().is_empty()),
        },
        other => other,
    }
}

fn non_empty(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Run `parse` over JSON candidates in `content`, most explicit first.
fn find_json<T>(content: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let attempt = |candidate: &str| -> Option<T> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return None;
        }
        parse(trimmed).or_else(|| parse(&escape_unescaped_newlines_in_json_strings(trimmed)))
    };

    for block in extract_json_code_fence_blocks(content) {
        if let Some(found) = attempt(&block) {
            return Some(found);
        }
    }
    if let Some(found) = attempt(content) {
        return Some(found);
    }
    extract_balanced_json_objects(content)
        .iter()
        .find_map(|candidate| attempt(candidate))
}

/// Extract ```json (or bare ```) blocks whose closing fence is on its own line.
fn extract_json_code_fence_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut search_from = 0usize;

    while let Some(rel_start) = content[search_from..].find("```") {
        let after_tag = search_from + rel_start + 3;

        // Fenced content begins after the next newline
        let content_start = match content[after_tag..].find('\n') {
            Some(rel_nl) => after_tag + rel_nl + 1,
            None => break,
        };

        let hay = &content[content_start..];
        if let Some(m) = END_FENCE.find(hay) {
            let end_fence_start = content_start + m.start();
            blocks.push(content[content_start..end_fence_start].to_string());
            search_from = content_start + m.end();
        } else {
            break;
        }
    }

    blocks
}

/// Top-level `{ ... }` candidates, found by brace balancing outside strings.
fn extract_balanced_json_objects(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;

    for (i, ch) in content.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(content[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    out
}

/// Escape literal `\n`/`\r` inside JSON string literals.
fn escape_unescaped_newlines_in_json_strings(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in input.chars() {
        if in_string {
            if escape {
                out.push(ch);
                escape = false;
                continue;
            }
            match ch {
                '\\' => {
                    out.push(ch);
                    escape = true;
                }
                '"' => {
                    out.push(ch);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(ch),
            }
        } else {
            out.push(ch);
            if ch == '"' {
                in_string = true;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StepStatus;

    #[test]
    fn test_fenced_command() {
        let text = "Sure:\n```json\n{\"type\":\"command\",\"command\":\"`df -h`\",\"explanation\":\"disk usage\"}\n```";
        let env = parse_envelope(text, ResponseContext::Propose).unwrap();
        assert_eq!(
            env,
            Envelope::Command {
                command: "df -h".to_string(),
                explanation: "disk usage".to_string(),
                risk: Risk::Low,
                estimated_time: EstimatedTime::Fast,
            }
        );
    }

    #[test]
    fn test_embedded_plan_gets_default_title() {
        let text = r#"Here is the plan {"type":"plan","steps":[{"command":"$ apt-get update -y","description":"refresh"}]} good luck"#;
        let Envelope::Plan(plan) = parse_envelope(text, ResponseContext::Fix).unwrap() else {
            panic!("expected plan");
        };
        assert_eq!(plan.title, "Fix Plan");
        assert_eq!(plan.steps[0].command, "apt-get update -y");
        assert_eq!(plan.steps[0].status, StepStatus::Pending);

        let Envelope::Plan(plan) =
            parse_envelope(r#"{"type":"plan","title":"","steps":[]}"#, ResponseContext::Propose).unwrap()
        else {
            panic!("expected plan");
        };
        assert_eq!(plan.title, "Execution Plan");
    }

    #[test]
    fn test_literal_newlines_in_strings() {
        let text = "{\"type\":\"info\",\"answer\":\"line one\nline two\"}";
        assert_eq!(
            parse_envelope(text, ResponseContext::Propose).unwrap(),
            Envelope::Info {
                answer: "line one\nline two".to_string()
            }
        );
    }

    #[test]
    fn test_raw_text_fallbacks() {
        assert_eq!(
            parse_envelope("sudo systemctl restart nginx", ResponseContext::Propose).unwrap(),
            Envelope::Command {
                command: "sudo systemctl restart nginx".to_string(),
                explanation: String::new(),
                risk: Risk::Low,
                estimated_time: EstimatedTime::Fast,
            }
        );
        assert_eq!(
            parse_envelope("`apt-get install -y nginx-full`", ResponseContext::Fix).unwrap(),
            Envelope::Fix {
                command: "apt-get install -y nginx-full".to_string(),
                explanation: String::new(),
                confidence: Confidence::Low,
            }
        );
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let env = parse_envelope(r#"{"type":"shrug"}"#, ResponseContext::Propose).unwrap();
        assert_eq!(env.kind(), "command");
    }

    #[test]
    fn test_empty_response_is_unusable() {
        let err = parse_envelope("   ", ResponseContext::Fix).unwrap_err();
        assert!(matches!(err, PilotError::UnusableResponse { .. }));
    }

    #[test]
    fn test_abort_defaults() {
        let env = parse_envelope(r#"{"type":"abort","reason":""}"#, ResponseContext::Fix).unwrap();
        assert_eq!(
            env,
            Envelope::Abort {
                reason: "This task cannot be completed.".to_string(),
                root_cause: "unknown".to_string(),
                suggestion: None,
            }
        );
    }

    #[test]
    fn test_interpretation_json_and_fallback() {
        let interp = parse_interpretation(
            "```json\n{\"success\": false, \"answer\": \"wrong distro\", \"permanentFailure\": true, \"failureCategory\": \"os_incompatible\"}\n```",
        );
        assert!(!interp.success);
        assert!(interp.permanent_failure);
        assert_eq!(interp.failure_category.as_deref(), Some("os_incompatible"));

        let interp = parse_interpretation("FAILED: package not found");
        assert!(!interp.success);
        assert!(!interp.permanent_failure);

        let interp = parse_interpretation("Disk usage is at 40%.");
        assert!(interp.success);
    }

    #[test]
    fn test_balanced_extraction_ignores_braces_in_strings() {
        let objs = extract_balanced_json_objects(r#"x {"a":"}{"} y {"b":1}"#);
        assert_eq!(objs, vec![r#"{"a":"}{"}"#.to_string(), r#"{"b":1}"#.to_string()]);
    }
}
