//! Command safety analysis
//!
//! Flags destructive commands so they always need human confirmation, even
//! when the provider did not declare them risky.

/// Safety level for a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSafety {
    /// Command is safe to execute
    Safe,
    /// Command is potentially dangerous
    Dangerous(String),
}

impl CommandSafety {
    /// Check if the command is dangerous
    pub fn is_dangerous(&self) -> bool {
        matches!(self, CommandSafety::Dangerous(_))
    }

    /// Get the reason for danger
    pub fn reason(&self) -> String {
        match self {
            CommandSafety::Safe => "Safe".to_string(),
            CommandSafety::Dangerous(reason) => reason.clone(),
        }
    }
}

/// Program name paired with an argument fragment that makes it dangerous.
/// An empty fragment means the program is dangerous on its own.
const DANGEROUS_PROGRAMS: &[(&str, &str)] = &[
    ("rm", "-r"),
    ("rm", "-R"),
    ("rm", "--recursive"),
    ("mkfs", ""),
    ("dd", "if="),
    ("shred", ""),
    ("wipefs", ""),
    ("fdisk", ""),
    ("parted", ""),
    ("chmod", "-R"),
    ("chown", "-R"),
    ("iptables", "-F"),
    ("iptables", "--flush"),
    ("userdel", ""),
    ("reboot", ""),
    ("shutdown", ""),
    ("poweroff", ""),
    ("halt", ""),
];

/// Substrings that are destructive anywhere in the command line.
const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "> /dev/sd",
    "> /dev/nvme",
    ":(){:|:&};:",
    ":(){ :|:& };:",
    "mv / ",
    "rm -rf /",
    "rm -rf /*",
    "systemctl stop ssh",
    "systemctl restart ssh",
    "service ssh stop",
    "service sshd stop",
];

/// Checker for command safety
#[derive(Debug, Default)]
pub struct SafetyChecker;

impl SafetyChecker {
    /// Create a new safety checker
    pub fn new() -> Self {
        SafetyChecker
    }

    /// Assess a full command line, including `&&`/`||`/`;`/`|` chains.
    pub fn assess_line(&self, command_str: &str) -> CommandSafety {
        for pattern in DESTRUCTIVE_PATTERNS {
            if command_str.contains(pattern) {
                return CommandSafety::Dangerous(format!(
                    "Command contains destructive pattern: {}",
                    pattern.trim()
                ));
            }
        }

        for segment in split_segments(command_str) {
            // Unbalanced quotes: fall back to whitespace splitting
            let parts = shell_words::split(segment)
                .unwrap_or_else(|_| segment.split_whitespace().map(str::to_string).collect());
            let parts = strip_wrappers(&parts);
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let safety = self.assess(command_str, command, args);
            if safety.is_dangerous() {
                return safety;
            }
        }

        CommandSafety::Safe
    }

    /// Assess the safety of a single parsed command
    pub fn assess(&self, command_str: &str, command: &str, args: &[String]) -> CommandSafety {
        let program = command.rsplit('/').next().unwrap_or(command);

        for (cmd, pattern) in DANGEROUS_PROGRAMS {
            let name_matches = program == *cmd || (*cmd == "mkfs" && program.starts_with("mkfs."));
            if name_matches && (pattern.is_empty() || args.iter().any(|arg| arg_matches(arg, pattern))) {
                return CommandSafety::Dangerous(format!(
                    "Command '{}' matches dangerous pattern: {} {}",
                    command_str, cmd, pattern
                ));
            }
        }

        CommandSafety::Safe
    }
}

/// Match one argument against a flag pattern: `--long` exactly, `-x` as a
/// letter in a short-flag cluster (`-rf`), `key=` as a prefix.
fn arg_matches(arg: &str, pattern: &str) -> bool {
    if pattern.starts_with("--") {
        return arg == pattern || arg.starts_with(&format!("{}=", pattern));
    }
    if let Some(letters) = pattern.strip_prefix('-') {
        return match arg.strip_prefix('-') {
            Some(cluster) if !cluster.starts_with('-') => letters.chars().all(|c| cluster.contains(c)),
            _ => false,
        };
    }
    arg.starts_with(pattern)
}

fn split_segments(command_str: &str) -> Vec<&str> {
    command_str
        .split("&&")
        .flat_map(|s| s.split("||"))
        .flat_map(|s| s.split(';'))
        .flat_map(|s| s.split('|'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Drop `sudo`, `env VAR=x` and similar prefixes.
fn strip_wrappers(parts: &[String]) -> &[String] {
    let mut idx = 0;
    let mut in_wrapper = false;
    while let Some(word) = parts.get(idx) {
        let is_wrapper = matches!(word.as_str(), "sudo" | "env" | "nohup" | "time" | "nice")
            || (word.contains('=') && !word.starts_with('-'))
            || (in_wrapper && word.starts_with('-'));
        if !is_wrapper {
            break;
        }
        in_wrapper = true;
        idx += 1;
    }
    &parts[idx..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_commands() {
        let checker = SafetyChecker::new();
        for cmd in ["ls -la", "sudo apt-get install -y nginx", "df -h | sort", "rm notes.txt"] {
            assert_eq!(checker.assess_line(cmd), CommandSafety::Safe, "{}", cmd);
        }
    }

    #[test]
    fn test_dangerous_commands() {
        let checker = SafetyChecker::new();
        for cmd in [
            "rm -rf /var/www/html",
            "sudo rm -r build",
            "apt-get update && sudo mkfs.ext4 /dev/sdb1",
            "dd if=/dev/zero of=/dev/sda bs=1M",
            "sudo chown -R www-data /",
            "sudo iptables -F",
            "sudo systemctl restart sshd",
            "sudo -E reboot",
        ] {
            assert!(checker.assess_line(cmd).is_dangerous(), "{}", cmd);
        }
    }

    #[test]
    fn test_flags_inside_words_are_not_flags() {
        let checker = SafetyChecker::new();
        for cmd in [
            "rm /tmp/weekly-report.txt",
            "rm notes-report.txt",
            "chmod 644 my-README",
            "chown u x-Rfile",
            "dd-helper if=/dev/zero",
        ] {
            assert_eq!(checker.assess_line(cmd), CommandSafety::Safe, "{}", cmd);
        }
        for cmd in ["rm -rf /x", "rm -fr /x", "rm -Rv build", "rm --recursive build", "chmod -R 777 /srv"] {
            assert!(checker.assess_line(cmd).is_dangerous(), "{}", cmd);
        }
    }

    #[test]
    fn test_unbalanced_quotes_still_checked() {
        let checker = SafetyChecker::new();
        assert!(checker.assess_line("rm -rf 'tmp").is_dangerous());
    }
}
