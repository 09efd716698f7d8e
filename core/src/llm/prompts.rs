//! Prompt construction for the propose, fix and interpret calls.

use super::provider::{FixRequest, GoalRequest, InterpretRequest};
use super::ChatMessage;
use crate::context::EnvironmentFacts;
use std::fmt::Write as _;

/// History lines included in fix and interpret requests.
pub const MAX_HISTORY_LINES: usize = 10;

/// Outputs longer than this are cut down to head + tail.
pub const TRUNCATE_THRESHOLD: usize = 8000;
pub const TRUNCATE_KEEP: usize = 3000;

const COMMAND_RULES: &str = r#"## COMMAND RULES (single commands and plan steps)
1. Always use non-interactive flags: -y for apt/yum/dnf, --noconfirm for pacman, DEBIAN_FRONTEND=noninteractive.
2. Edit files with sed, awk or tee. Never use vi, vim, nano or emacs.
3. Prefix with sudo when root is needed. Never use "sudo -n": password prompts are answered by the terminal.
4. One short command per command or step (under ~150 characters). Never chain with && or ;.
5. Prefer systemctl over service and ip over ifconfig."#;

const PROPOSE_SYSTEM: &str = r#"You are an expert Linux/Unix system administrator operating a remote shell for the user. Analyze each request and answer with ONLY a JSON object (no markdown, no backticks) of one of these types:

{"type":"command","command":"one short command","explanation":"one sentence","risk":"low|medium|high","estimatedTime":"fast|moderate|slow"}
  Only for simple single operations: status checks, reading a file, simple queries.
{"type":"plan","title":"short title","steps":[{"command":"cmd","description":"what it does"}],"explanation":"overview"}
  The default for anything needing two or more commands: installations, server setup, configuration changes, service restarts.
{"type":"impossible","reason":"why this cannot be done here","suggestion":"alternative or null"}
  When the software does not support this OS, distro or architecture, or the action would cut off the session with no recovery.
{"type":"info","answer":"your answer"}
  For questions that need no command.
{"type":"clarification","question":"what you need to know","options":["option 1","option 2"]}
  When the request is ambiguous or misses critical information.

## FEASIBILITY (check first)
- OS and distro support: apt on RHEL-family or yum/dnf on Debian-family systems is "impossible"; suggest the native tool.
- Architecture support (arm64 vs x86_64), privilege level, and whether the package exists in the system's repositories.

## CONTEXT
Short follow-ups ("again", "undo", "fix it", "check", "yes") refer to the previous turn.

## SAFETY
Mark risk "high" for rm -rf, dd, mkfs, fdisk, iptables, sshd changes and partitioning. Prefer atomic edits (sed -i.bak)."#;

const FIX_SYSTEM: &str = r#"You are an expert system administrator debugging a failed command on a remote Linux server. Answer with ONLY a JSON object of one of these types:

{"type":"fix","command":"one short corrected command","explanation":"what was wrong and what this changes","confidence":"high|medium|low"}
{"type":"plan","title":"short title","steps":[{"command":"cmd","description":"what it does"}],"explanation":"what the plan fixes"}
  Use a plan when the fix needs several steps or the failed command was a long chain.
{"type":"abort","reason":"why this will never work","rootCause":"category","suggestion":"alternative or null"}

Root cause categories for abort: os_incompatible, arch_incompatible, missing_hardware, permission_permanent, resource_exhausted, network_unreachable, software_conflict, deprecated, circular_dependency.

## RULES
- Never repeat a command that already failed. Try a genuinely different approach.
- The same error across several attempts usually means a fundamental problem: abort.
- OS or distro incompatibility always aborts with rootCause "os_incompatible".
- Be honest about confidence.

## FIX STRATEGIES
Long chain failed: split into a plan. "sudo: a password is required": drop -n. Missing package: install it. Permission denied: add sudo. File not found: create parent directories or correct the path. Package not found: refresh repositories or use the distro's package name. Port in use: find the process. Dpkg lock: wait for or stop the holder. Syntax error: fix the syntax."#;

const INTERPRET_SYSTEM: &str = r#"You are an expert system administrator. Interpret the output of a command run on a remote server. Answer with ONLY this JSON object:
{"success": true or false, "answer": "human-friendly interpretation", "permanentFailure": true or false, "failureCategory": "string or null"}

- success: whether the command achieved its intended goal.
- permanentFailure (only when success is false): true when no retry or different command can help, for example wrong OS, missing hardware, unsupported architecture or deprecated software. Package name mistakes, missing sudo and syntax errors are NOT permanent.
- failureCategory (only when permanentFailure is true): os_incompatible, arch_incompatible, missing_hardware or unsupported; otherwise null.
- answer: concise. Summarize key numbers for data output, confirm what changed for modifications, explain errors and whether they are fixable. Use **bold** for important values and `backticks` for paths and commands. Do not repeat the raw output."#;

/// Keep the first and last 3000 characters of long outputs.
pub fn truncate_output(output: &str) -> String {
    let len = output.chars().count();
    if len <= TRUNCATE_THRESHOLD {
        return output.to_string();
    }

    let head: String = output.chars().take(TRUNCATE_KEEP).collect();
    let tail: String = output.chars().skip(len - TRUNCATE_KEEP).collect();
    format!(
        "{}\n\n... [{} characters truncated] ...\n\n{}",
        head,
        len - 2 * TRUNCATE_KEEP,
        tail
    )
}

fn with_environment(base: &str, environment: Option<&EnvironmentFacts>) -> String {
    match environment {
        Some(facts) => format!("{}\n{}", base, facts.to_prompt_section()),
        None => base.to_string(),
    }
}

fn recent(history: &[String]) -> &[String] {
    &history[history.len().saturating_sub(MAX_HISTORY_LINES)..]
}

pub fn propose_messages(request: &GoalRequest) -> Vec<ChatMessage> {
    let system = with_environment(
        &format!("{}\n\n{}", PROPOSE_SYSTEM, COMMAND_RULES),
        request.environment.as_ref(),
    );

    let output = request.recent_output.trim();
    let user = if request.history.is_empty() {
        if output.is_empty() {
            format!("Request: {}", request.goal)
        } else {
            format!("Recent terminal state:\n{}\n\n---\nRequest: {}", output, request.goal)
        }
    } else {
        format!(
            "CONVERSATION CONTEXT:\n{}\n\n---\nRecent terminal state:\n{}\n\n---\nCurrent request: {}",
            request.history.join("\n"),
            if output.is_empty() { "(empty)" } else { output },
            request.goal
        )
    };

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn fix_messages(request: &FixRequest) -> Vec<ChatMessage> {
    let system = with_environment(
        &format!("{}\n\n{}", FIX_SYSTEM, COMMAND_RULES),
        request.environment.as_ref(),
    );

    let mut user = format!("Original goal: {}", request.goal);
    if !request.history.is_empty() {
        let _ = write!(user, "\nConversation context:\n{}", recent(&request.history).join("\n"));
    }
    if !request.failed_commands.is_empty() {
        user.push_str("\nPreviously failed commands (DO NOT repeat these exact commands):");
        for (i, cmd) in request.failed_commands.iter().enumerate() {
            let _ = write!(user, "\n  {}. {}", i + 1, cmd);
        }
    }
    let _ = write!(
        user,
        "\n\nLatest error output:\n{}",
        truncate_output(&request.failed_output)
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn interpret_messages(request: &InterpretRequest) -> Vec<ChatMessage> {
    let system = with_environment(INTERPRET_SYSTEM, request.environment.as_ref());

    let mut user = String::new();
    if !request.history.is_empty() {
        let _ = write!(user, "Previous conversation:\n{}\n\n", recent(&request.history).join("\n"));
    }
    let _ = write!(
        user,
        "User's question: {}\n\nCommand executed: {}\n\nCommand output:\n{}",
        request.goal,
        request.command,
        truncate_output(&request.output)
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short"), "short");

        let long = format!("{}{}{}", "a".repeat(3000), "m".repeat(3000), "z".repeat(3000));
        let cut = truncate_output(&long);
        assert!(cut.starts_with(&"a".repeat(3000)));
        assert!(cut.ends_with(&"z".repeat(3000)));
        assert!(cut.contains("... [3000 characters truncated] ..."));
        assert!(!cut.contains('m'));
    }

    #[test]
    fn test_fix_lists_failed_commands_and_recent_history() {
        let history: Vec<String> = (0..15).map(|i| format!("turn {}", i)).collect();
        let request = FixRequest {
            goal: "install nginx".to_string(),
            failed_output: "E: Unable to locate package ngnix".to_string(),
            failed_commands: vec!["apt-get install -y ngnix".to_string()],
            history,
            environment: None,
        };
        let messages = fix_messages(&request);
        assert_eq!(messages[0].role, MessageRole::System);
        let user = &messages[1].content;
        assert!(user.contains("1. apt-get install -y ngnix"));
        assert!(user.contains("turn 14"));
        assert!(user.contains("turn 5"));
        assert!(!user.contains("turn 4\n"));
        assert!(user.ends_with("E: Unable to locate package ngnix"));
    }

    #[test]
    fn test_environment_section_included() {
        let facts = EnvironmentFacts {
            distro: Some("Ubuntu 22.04.4 LTS".to_string()),
            package_manager: Some("apt".to_string()),
            ..EnvironmentFacts::default()
        };
        let request = GoalRequest {
            goal: "disk usage".to_string(),
            recent_output: String::new(),
            history: Vec::new(),
            environment: Some(facts),
        };
        let messages = propose_messages(&request);
        assert!(messages[0].content.contains("- Package Manager: apt"));
        assert_eq!(messages[1].content, "Request: disk usage");
    }

    #[test]
    fn test_interpret_message_shape() {
        let request = InterpretRequest {
            goal: "free memory".to_string(),
            command: "free -m".to_string(),
            output: "Mem: 2000 1000 1000".to_string(),
            history: vec!["user: free memory".to_string()],
            environment: None,
        };
        let user = &interpret_messages(&request)[1].content;
        assert!(user.starts_with("Previous conversation:\nuser: free memory"));
        assert!(user.contains("Command executed: free -m"));
    }
}
