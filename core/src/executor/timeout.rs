//! Per-command timeout selection

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    static ref LONG_RUNNING: Regex = Regex::new(
        r"\b(?:apt-get\s+(?:install|upgrade|dist-upgrade|update)|apt\s+(?:install|upgrade|full-upgrade|update)|yum\s+(?:install|update)|dnf\s+(?:install|update)|pacman\s+-S|pip3?\s+install|npm\s+install|yarn\s+(?:install|add)|composer\s+(?:install|update)|docker\s+(?:pull|build)|git\s+clone|wget\s|curl\s.*-o|make\b|cmake\b|cargo\s+build|go\s+build)"
    )
    .expect("valid timeout regex");
    static ref MEDIUM_RUNNING: Regex = Regex::new(
        r"\b(?:service\s|systemctl\s|tar\s|zip\s|unzip\s|gzip\s|rsync\s|scp\s|cp\s+-r|find\s|du\s|certbot|letsencrypt)"
    )
    .expect("valid timeout regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Long,
    Medium,
    Default,
}

/// Keyword-based timeout durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    #[serde(with = "secs")]
    pub long: Duration,
    #[serde(with = "secs")]
    pub medium: Duration,
    #[serde(with = "secs")]
    pub default: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            long: Duration::from_secs(600),
            medium: Duration::from_secs(180),
            default: Duration::from_secs(120),
        }
    }
}

impl TimeoutPolicy {
    pub fn class_of(command: &str) -> TimeoutClass {
        let cmd = command.to_lowercase();
        if LONG_RUNNING.is_match(&cmd) {
            TimeoutClass::Long
        } else if MEDIUM_RUNNING.is_match(&cmd) {
            TimeoutClass::Medium
        } else {
            TimeoutClass::Default
        }
    }

    pub fn for_command(&self, command: &str) -> Duration {
        match Self::class_of(command) {
            TimeoutClass::Long => self.long,
            TimeoutClass::Medium => self.medium,
            TimeoutClass::Default => self.default,
        }
    }
}

/// Serialize durations as whole seconds in config files.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Same as [`secs`], in milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classes() {
        let cases = [
            ("sudo apt-get install -y nginx", TimeoutClass::Long),
            ("apt update", TimeoutClass::Long),
            ("git clone https://github.com/x/y", TimeoutClass::Long),
            ("curl -fsSL https://x/install.sh -o install.sh", TimeoutClass::Long),
            ("make -j4", TimeoutClass::Long),
            ("sudo systemctl restart nginx", TimeoutClass::Medium),
            ("tar xzf backup.tgz", TimeoutClass::Medium),
            ("find / -name '*.conf'", TimeoutClass::Medium),
            ("echo hi", TimeoutClass::Default),
            ("ls -la", TimeoutClass::Default),
        ];
        for (cmd, class) in cases {
            assert_eq!(TimeoutPolicy::class_of(cmd), class, "{}", cmd);
        }
    }

    #[test]
    fn test_durations() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.for_command("pip install requests"), Duration::from_secs(600));
        assert_eq!(policy.for_command("du -sh /var"), Duration::from_secs(180));
        assert_eq!(policy.for_command("uptime"), Duration::from_secs(120));
    }
}
