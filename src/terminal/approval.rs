//! Terminal approval prompts
//!
//! Bridges the pilot's approval hooks to dialoguer prompts. Prompts block,
//! so each one runs on the blocking pool.

use async_trait::async_trait;
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use shellpilot_core::orchestrator::{Approver, StepDecision};
use shellpilot_core::output::OutputFormatter;
use shellpilot_core::protocol::Plan;

pub struct TerminalApprover;

async fn prompt_blocking<T, F>(prompt: F, fallback: T) -> T
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(prompt).await {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            shellpilot_core::warn_log!("prompt failed: {}", e);
            fallback
        }
        Err(e) => {
            shellpilot_core::error_log!("prompt task failed: {}", e);
            fallback
        }
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn confirm_command(&self, command: &str, _explanation: &str, high_risk: bool) -> bool {
        let prompt = if high_risk {
            format!("Run HIGH-RISK command `{}`?", command)
        } else {
            format!("Run `{}`?", command)
        };
        prompt_blocking(
            move || {
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(!high_risk)
                    .interact()
            },
            false,
        )
        .await
    }

    async fn confirm_plan(&self, plan: &Plan) -> bool {
        println!("{}", OutputFormatter::new().format_plan(plan));
        let prompt = format!("Execute these {} steps?", plan.steps.len());
        prompt_blocking(
            move || {
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(true)
                    .interact()
            },
            false,
        )
        .await
    }

    async fn on_step_failure(&self, plan: &Plan, index: usize, error: &str) -> StepDecision {
        let prompt = format!(
            "Step {}/{} failed: {}",
            index + 1,
            plan.steps.len(),
            error.lines().next().unwrap_or(error)
        );
        let choice = prompt_blocking(
            move || {
                Select::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .items(&["Retry", "Skip", "Stop"])
                    .default(0)
                    .interact()
            },
            2,
        )
        .await;
        match choice {
            0 => StepDecision::Retry,
            1 => StepDecision::Skip,
            _ => StepDecision::Stop,
        }
    }
}
