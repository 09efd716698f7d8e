//! Output formatting module
//!
//! Renders pilot events, verdicts, plan reports and detected environment
//! facts for the terminal using colored output.

use crate::config::Config;
use crate::context::EnvironmentFacts;
use crate::executor::ExitClass;
use crate::orchestrator::{PilotEvent, PlanOutcome, PlanReport, TaskVerdict};
use crate::protocol::{Plan, StepStatus};
use console::Style;

/// Output formatter for CLI results
pub struct OutputFormatter {
    // Styles
    blue: Style,
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
    bold: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl OutputFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a progress event, if it is worth showing.
    pub fn print_event(&self, event: &PilotEvent) {
        if let Some(line) = self.format_event(event) {
            println!("{}", line);
        }
    }

    /// One-line rendering of an event. `None` for events with nothing to show.
    pub fn format_event(&self, event: &PilotEvent) -> Option<String> {
        match event {
            PilotEvent::Status { message, .. } => Some(self.dim.apply_to(format!("… {}", message)).to_string()),
            PilotEvent::CommandProposed {
                command,
                explanation,
                high_risk,
                ..
            } => {
                let mut line = format!("{} {}", self.bold.apply_to("Proposed:"), self.blue.apply_to(command));
                if *high_risk {
                    line.push_str(&format!(" {}", self.red.apply_to("[high risk]")));
                }
                if !explanation.is_empty() {
                    line.push_str(&format!("\n  {}", self.dim.apply_to(explanation)));
                }
                Some(line)
            }
            PilotEvent::ExecutionStarted { command, .. } => {
                Some(format!("{} {}", self.bold.apply_to("$"), self.blue.apply_to(command)))
            }
            PilotEvent::ExecutionFinished { result, .. } => {
                let label = match result.exit {
                    ExitClass::Success => self.green.apply_to("ok".to_string()),
                    ExitClass::Error => self.red.apply_to("error".to_string()),
                    ExitClass::TimedOut => self.yellow.apply_to("timed out".to_string()),
                    ExitClass::Cancelled => self.yellow.apply_to("cancelled".to_string()),
                    ExitClass::TransportError => self.red.apply_to("transport error".to_string()),
                    ExitClass::CredentialRequired => self.yellow.apply_to("credentials required".to_string()),
                };
                let mut line = format!("  -> {} ({:.1}s)", label, result.duration.as_secs_f64());
                if result.interactive_responses > 0 {
                    line.push_str(&format!(", {} prompt(s) answered", result.interactive_responses));
                }
                Some(line)
            }
            PilotEvent::Interpreted { interpretation, .. } => {
                if interpretation.answer.is_empty() {
                    None
                } else {
                    Some(interpretation.answer.clone())
                }
            }
            PilotEvent::FixRequested {
                attempt,
                failed_commands,
                ..
            } => Some(
                self.yellow
                    .apply_to(format!(
                        "Attempt {} failed ({} distinct command(s) tried), asking for a fix",
                        attempt,
                        failed_commands.len()
                    ))
                    .to_string(),
            ),
            PilotEvent::PlanStarted { plan, .. } => Some(self.format_plan(plan)),
            PilotEvent::StepStatusChanged {
                index,
                command,
                status,
                ..
            } => match status {
                StepStatus::Pending => None,
                _ => Some(format!("  {} {}. {}", self.step_icon(*status), index + 1, command)),
            },
            PilotEvent::PlanFinished { .. } => None,
            PilotEvent::Finished { verdict, .. } => Some(self.format_verdict(verdict)),
        }
    }

    fn step_icon(&self, status: StepStatus) -> String {
        match status {
            StepStatus::Pending => self.dim.apply_to("○").to_string(),
            StepStatus::Running => self.blue.apply_to("▶").to_string(),
            StepStatus::Done => self.green.apply_to("✓").to_string(),
            StepStatus::Failed => self.red.apply_to("✗").to_string(),
        }
    }

    /// Numbered step list with status icons.
    pub fn format_plan(&self, plan: &Plan) -> String {
        let mut out = format!("{}", self.bold.apply_to(&plan.title));
        for (i, step) in plan.steps.iter().enumerate() {
            out.push_str(&format!("\n  {} {}. {}", self.step_icon(step.status), i + 1, step.command));
            if !step.description.is_empty() {
                out.push_str(&format!(" {}", self.dim.apply_to(format!("({})", step.description))));
            }
        }
        out
    }

    pub fn format_plan_report(&self, report: &PlanReport) -> String {
        let headline = match report.outcome {
            PlanOutcome::Completed => self.green.apply_to("Plan completed".to_string()),
            PlanOutcome::CompletedWithFailures => self.yellow.apply_to("Plan completed with failures".to_string()),
            PlanOutcome::Stopped => self.red.apply_to("Plan stopped".to_string()),
            PlanOutcome::Impossible => self.red.apply_to("Plan cannot be completed".to_string()),
            PlanOutcome::Cancelled => self.yellow.apply_to("Plan cancelled".to_string()),
            PlanOutcome::Declined => self.yellow.apply_to("Plan declined".to_string()),
        };
        let mut out = format!(
            "{}: {}/{} done, {} failed, {} skipped",
            headline,
            report.done,
            report.total(),
            report.failed,
            report.skipped
        );
        if let Some(message) = &report.message {
            out.push_str(&format!("\n  {}", message));
        }
        if let Some(root_cause) = &report.root_cause {
            out.push_str(&format!("\n  Root cause: {}", self.yellow.apply_to(root_cause)));
        }
        out
    }

    /// Final summary for a task.
    pub fn format_verdict(&self, verdict: &TaskVerdict) -> String {
        match verdict {
            TaskVerdict::Success { command, answer } => {
                let mut out = format!("{} {}", self.green.apply_to("✓ Done:"), command);
                if let Some(answer) = answer {
                    out.push_str(&format!("\n{}", answer));
                }
                out
            }
            TaskVerdict::PermanentFailure {
                reason,
                root_cause,
                suggestion,
            } => {
                let mut out = format!(
                    "{} {}\n  Root cause: {}",
                    self.red.apply_to("✗ Cannot be done:"),
                    reason,
                    self.yellow.apply_to(root_cause)
                );
                if let Some(suggestion) = suggestion {
                    out.push_str(&format!("\n  Suggestion: {}", suggestion));
                }
                out
            }
            TaskVerdict::LoopPrevented { command } => format!(
                "{} the fix repeated a command that already failed: {}",
                self.red.apply_to("✗ Stopped:"),
                command
            ),
            TaskVerdict::MaxRetries { attempts, last_command } => format!(
                "{} gave up after {} attempts (last: {})",
                self.red.apply_to("✗ Stopped:"),
                attempts,
                last_command
            ),
            TaskVerdict::TimedOut { command } => format!(
                "{} {} (it may still be running)",
                self.yellow.apply_to("⏱ Timed out:"),
                command
            ),
            TaskVerdict::TransportError { message } => {
                format!("{} {}", self.red.apply_to("✗ Shell error:"), message)
            }
            TaskVerdict::CredentialRequired { command } => format!(
                "{} {} asked for a password. Provide one and run it again.",
                self.yellow.apply_to("🔒 Credentials required:"),
                command
            ),
            TaskVerdict::Declined => self.yellow.apply_to("Declined.").to_string(),
            TaskVerdict::Cancelled => self.yellow.apply_to("Cancelled.").to_string(),
            TaskVerdict::ProviderFailed { message } => {
                format!("{} {}", self.red.apply_to("✗ Provider error:"), message)
            }
            TaskVerdict::Info { answer } => answer.clone(),
            TaskVerdict::NeedsClarification { question, options } => {
                let mut out = format!("{} {}", self.blue.apply_to("?"), question);
                for option in options {
                    out.push_str(&format!("\n  - {}", option));
                }
                out
            }
            TaskVerdict::Plan(report) => self.format_plan_report(report),
        }
    }

    pub fn print_verdict(&self, verdict: &TaskVerdict) {
        println!();
        println!("{}", self.format_verdict(verdict));
    }

    /// Print the detected target environment
    pub fn print_environment(&self, facts: &EnvironmentFacts) {
        println!();
        println!("{}", self.bold.apply_to("Target Environment:"));
        let rows = [
            ("OS", &facts.os),
            ("Distribution", &facts.distro),
            ("Version", &facts.version),
            ("Architecture", &facts.arch),
            ("Shell", &facts.shell),
            ("User", &facts.user),
            ("Package manager", &facts.package_manager),
            ("Init system", &facts.init_system),
        ];
        for (label, value) in rows {
            if let Some(value) = value {
                println!("{}: {}", label, self.green.apply_to(value));
            }
        }
    }

    /// Print the active configuration, without secrets
    pub fn print_config(&self, config: &Config) {
        println!();
        println!("{}", self.bold.apply_to("Current Configuration:"));
        println!("- Base URL: {}", self.green.apply_to(&config.provider.base_url));
        println!("- Model: {}", self.green.apply_to(&config.provider.model));
        println!(
            "- API key: {}",
            if config.api_key().is_some() { "set" } else { "not set" }
        );
        println!("- Mode: {:?}", config.execution.mode);
        println!("- Max retries: {}", config.execution.max_retries);
        println!("- Trust policy: {:?}", config.policy.trust);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PlanStep;
    use console::strip_ansi_codes;

    fn plain(text: &str) -> String {
        strip_ansi_codes(text).into_owned()
    }

    #[test]
    fn test_high_risk_proposal_is_flagged() {
        let formatter = OutputFormatter::new();
        let line = formatter
            .format_event(&PilotEvent::CommandProposed {
                session_id: "s1".to_string(),
                command: "rm -rf /tmp/build".to_string(),
                explanation: "clean up".to_string(),
                high_risk: true,
            })
            .unwrap();
        let line = plain(&line);
        assert!(line.contains("rm -rf /tmp/build"));
        assert!(line.contains("[high risk]"));
        assert!(line.contains("clean up"));
    }

    #[test]
    fn test_quiet_events() {
        let formatter = OutputFormatter::new();
        assert!(formatter
            .format_event(&PilotEvent::StepStatusChanged {
                session_id: "s1".to_string(),
                index: 0,
                command: "ls".to_string(),
                status: StepStatus::Pending,
            })
            .is_none());
    }

    #[test]
    fn test_plan_report_summary() {
        let mut plan = Plan::new(
            "Install app",
            vec![PlanStep::new("apt-get update -y", ""), PlanStep::new("apt-get install -y foo", "")],
        );
        plan.steps[0].status = StepStatus::Done;
        plan.steps[1].status = StepStatus::Failed;
        let report = PlanReport::new(plan, PlanOutcome::Impossible, &[false, false])
            .with_failure("foo is not packaged here", Some("os_incompatible".to_string()));

        let text = plain(&OutputFormatter::new().format_verdict(&TaskVerdict::Plan(report)));
        assert!(text.starts_with("Plan cannot be completed: 1/2 done, 1 failed, 0 skipped"));
        assert!(text.contains("Root cause: os_incompatible"));
    }

    #[test]
    fn test_clarification_lists_options() {
        let text = plain(&OutputFormatter::new().format_verdict(&TaskVerdict::NeedsClarification {
            question: "Which web server?".to_string(),
            options: vec!["nginx".to_string(), "apache".to_string()],
        }));
        assert_eq!(text, "? Which web server?\n  - nginx\n  - apache");
    }
}
