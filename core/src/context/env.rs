//! Environment detection over the live session

use crate::error::{PilotError, Result};
use crate::executor::{CommandExecutor, ExecutionRequest, ExitClass};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One-shot command printing `SP_*=` markers followed by `/etc/os-release`.
pub const DETECT_COMMAND: &str = concat!(
    r#"echo "SP_KERNEL=$(uname -s)"; echo "SP_ARCH=$(uname -m)"; "#,
    r#"echo "SP_SHELL=$SHELL"; echo "SP_USER=$(whoami)"; "#,
    r#"echo "SP_PKG=$(command -v apt-get dnf yum pacman zypper apk 2>/dev/null | head -n1)"; "#,
    r#"echo "SP_INIT=$(ps -p 1 -o comm= 2>/dev/null)"; cat /etc/os-release 2>/dev/null"#
);

const DETECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentFacts {
    pub os: Option<String>,
    pub distro: Option<String>,
    pub distro_id: Option<String>,
    pub version: Option<String>,
    pub shell: Option<String>,
    pub user: Option<String>,
    pub package_manager: Option<String>,
    pub init_system: Option<String>,
    pub arch: Option<String>,
}

impl EnvironmentFacts {
    /// Parse the output of [`DETECT_COMMAND`].
    pub fn from_detect_output(output: &str) -> Self {
        let mut facts = EnvironmentFacts::default();
        let mut pretty_name = None;
        let mut name = None;

        for line in output.lines() {
            let line = line.trim();
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim();
            if value.is_empty() || value.contains("$(") {
                continue;
            }
            let value = Some(value.to_string());
            match key {
                "SP_KERNEL" => facts.os = value,
                "SP_ARCH" => facts.arch = value,
                "SP_SHELL" => facts.shell = value,
                "SP_USER" => facts.user = value,
                "SP_PKG" => {
                    facts.package_manager = value.map(|path| {
                        let bin = path.rsplit('/').next().unwrap_or(&path).to_string();
                        if bin == "apt-get" {
                            "apt".to_string()
                        } else {
                            bin
                        }
                    })
                }
                "SP_INIT" => facts.init_system = value,
                "ID" => facts.distro_id = value,
                "VERSION_ID" => facts.version = value,
                "PRETTY_NAME" => pretty_name = value,
                "NAME" => name = value,
                _ => {}
            }
        }

        facts.distro = pretty_name.or(name);
        facts
    }

    pub fn is_empty(&self) -> bool {
        *self == EnvironmentFacts::default()
    }

    /// Markdown section appended to provider system prompts.
    pub fn to_prompt_section(&self) -> String {
        fn show(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("Unknown")
        }

        let mut out = String::from("\n## Target System Environment:\n");
        let _ = writeln!(out, "- OS: {}", show(&self.os));
        let _ = writeln!(
            out,
            "- Distribution: {} (ID: {}, Version: {})",
            show(&self.distro),
            self.distro_id.as_deref().unwrap_or("unknown"),
            self.version.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(out, "- Shell: {}", show(&self.shell));
        let _ = writeln!(out, "- User: {}", show(&self.user));
        let _ = writeln!(out, "- Package Manager: {}", show(&self.package_manager));
        let _ = writeln!(out, "- Init System: {}", show(&self.init_system));
        let _ = writeln!(out, "- Architecture: {}", show(&self.arch));
        out
    }
}

/// Inspect the target through the session and remember the result on it.
pub async fn detect_environment(
    executor: &CommandExecutor,
    session: &Session,
    cancel: &CancellationToken,
) -> Result<EnvironmentFacts> {
    let request = ExecutionRequest::new(DETECT_COMMAND).with_timeout(DETECT_TIMEOUT);
    let result = executor.execute(session, request, cancel).await;

    match result.exit {
        ExitClass::Cancelled => return Err(PilotError::Cancelled),
        ExitClass::TransportError => {
            return Err(PilotError::SessionClosed {
                session_id: session.id().to_string(),
            })
        }
        _ => {}
    }

    let facts = EnvironmentFacts::from_detect_output(result.output_after_echo());
    if facts.is_empty() {
        crate::warn_log!("[{}] environment detection returned nothing usable", session.id());
    } else {
        crate::info_log!(
            "[{}] environment: {} {} ({})",
            session.id(),
            facts.distro.as_deref().unwrap_or("unknown distro"),
            facts.arch.as_deref().unwrap_or("?"),
            facts.package_manager.as_deref().unwrap_or("no package manager")
        );
    }
    session.set_environment(facts.clone());
    Ok(facts)
}
