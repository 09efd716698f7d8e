//! Outcome classifier
//!
//! Scores sanitized command output line by line against a weighted rule
//! table. There is no exit code on an interactive stream, so this is the
//! only local signal of failure.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Minimum error score for output to count as failed.
pub const ERROR_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Error,
    Success,
}

/// One weighted line pattern, optionally vetoed by an exclusion pattern.
pub struct ClassifierRule {
    pub polarity: Polarity,
    pub evidence: &'static str,
    pub weight: u32,
    pattern: Regex,
    exclusion: Option<Regex>,
}

impl ClassifierRule {
    fn error(evidence: &'static str, weight: u32, pattern: &str) -> Self {
        Self::build(Polarity::Error, evidence, weight, pattern, None)
    }

    fn success(evidence: &'static str, weight: u32, pattern: &str) -> Self {
        Self::build(Polarity::Success, evidence, weight, pattern, None)
    }

    fn unless(mut self, exclusion: &str) -> Self {
        self.exclusion = Some(Regex::new(exclusion).expect("valid classifier regex"));
        self
    }

    fn build(
        polarity: Polarity,
        evidence: &'static str,
        weight: u32,
        pattern: &str,
        exclusion: Option<Regex>,
    ) -> Self {
        Self {
            polarity,
            evidence,
            weight,
            pattern: Regex::new(pattern).expect("valid classifier regex"),
            exclusion,
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
            && !self.exclusion.as_ref().is_some_and(|ex| ex.is_match(line))
    }
}

lazy_static! {
    pub static ref CLASSIFIER_RULES: Vec<ClassifierRule> = vec![
        ClassifierRule::error("command not found", 3, r"(?i)^-?(?:bash|sh|zsh|fish): .+: command not found$"),
        ClassifierRule::error("shell missing file", 3, r"(?i)^(?:bash|sh|zsh|fish): .+: No such file or directory$"),
        ClassifierRule::error("apt error", 3, r"^E: ").unless(r"^E: 0\b"),
        ClassifierRule::error("compiler error", 2, r"^error\["),
        ClassifierRule::error("fatal", 3, r"(?i)^fatal:"),
        ClassifierRule::error("ERROR prefix", 2, r"(?i)^ERROR:"),
        ClassifierRule::error("permission denied", 2, r"(?i)Permission denied")
            .unless(r"(?i)\b0 permission denied"),
        ClassifierRule::error("operation not permitted", 2, r"(?i)Operation not permitted"),
        ClassifierRule::error(
            "cannot perform",
            2,
            r"(?i)(?:Cannot|Could not|Unable to) (?:open|find|read|write|access|connect|create|delete|remove)",
        ),
        ClassifierRule::error("no such file", 2, r"(?i)No such file or directory"),
        ClassifierRule::error("dpkg error", 3, r"(?i)^dpkg: error"),
        ClassifierRule::error("segfault", 3, r"(?i)Segmentation fault"),
        ClassifierRule::error("killed", 2, r"(?i)Killed$"),
        ClassifierRule::error("python traceback", 3, r"(?i)^Traceback \(most recent call last\)"),
        ClassifierRule::error("panic", 3, r"(?i)panic:"),
        ClassifierRule::error("syntax error", 2, r"(?i)syntax error"),

        ClassifierRule::success(
            "success word",
            1,
            r"(?i)\b(?:success(?:fully)?|done|completed?|ok|started|enabled|active|running|created|installed|updated|configured|restarted|reloaded)\b",
        )
        .unless(r"(?i)\b(?:not|no|un|dis|fail|error)\b"),
        ClassifierRule::success("setting up", 1, r"(?i)^Setting up "),
        ClassifierRule::success("processing triggers", 1, r"(?i)^Processing triggers"),
        ClassifierRule::success("newest version", 1, r"(?i)is already the newest version"),
        ClassifierRule::success("nothing to upgrade", 1, r"(?i)^0 upgraded, 0 newly installed"),
        ClassifierRule::success("packages changed", 2, r"(?i)^\d+ upgraded, \d+ newly installed"),
        // Zero counters such as `errors: 0` read like failures but are not
        ClassifierRule::success("zero error count", 1, r"(?i)^(?:failed|error)\w*\s*[:=]\s*0\b"),
    ];
}

/// Scores and decision for one block of output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub error_score: u32,
    pub success_score: u32,
    pub is_error: bool,
    /// Evidence labels of the rules that fired, in output order.
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Classify sanitized output.
///
/// More success evidence than error evidence always wins; otherwise the
/// output is an error once the error score reaches [`ERROR_THRESHOLD`].
pub fn classify(output: &str) -> Verdict {
    let mut verdict = Verdict::default();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for rule in CLASSIFIER_RULES.iter().filter(|r| r.matches(line)) {
            match rule.polarity {
                Polarity::Error => verdict.error_score += rule.weight,
                Polarity::Success => verdict.success_score += rule.weight,
            }
            verdict.evidence.push(rule.evidence.to_string());
        }
    }

    verdict.is_error = if verdict.success_score > verdict.error_score {
        false
    } else {
        verdict.error_score >= ERROR_THRESHOLD
    };
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apt_unable_to_locate() {
        let v = classify("E: Unable to locate package foo");
        assert_eq!(v.error_score, 3);
        assert!(v.is_error);
    }

    #[test]
    fn test_apt_zero_is_not_error() {
        let v = classify("E: 0 packages failed");
        assert_eq!(v.error_score, 0);
    }

    #[test]
    fn test_clean_echo() {
        let v = classify("user@host:~$ echo hi\nhi\nuser@host:~$ ");
        assert!(!v.is_error);
        assert_eq!(v.error_score, 0);
    }

    #[test]
    fn test_command_not_found() {
        let v = classify("bash: foo: command not found");
        assert!(v.is_error);
        assert!(v.evidence.contains(&"command not found".to_string()));

        assert!(classify("-bash: nginxx: command not found").is_error);
    }

    #[test]
    fn test_success_outweighs_error() {
        let output = "Permission denied\nSetting up nginx (1.18.0) ...\nProcessing triggers for man-db\nReading package lists... Done";
        let v = classify(output);
        assert_eq!(v.error_score, 2);
        assert_eq!(v.success_score, 3);
        assert!(!v.is_error);
    }

    #[test]
    fn test_negated_success_word_does_not_count() {
        let v = classify("Service not started");
        assert_eq!(v.success_score, 0);
    }

    #[test]
    fn test_zero_counts_are_noise() {
        let v = classify("errors: 0\n0 permission denied");
        assert_eq!(v.error_score, 0);
        assert_eq!(v.success_score, 1);
        assert!(!v.is_error);
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(classify("Killed").is_error);
        assert!(!classify("something odd happened").is_error);
    }

    #[test]
    fn test_python_traceback() {
        let v = classify("Traceback (most recent call last):\n  File \"x.py\", line 1\nNameError: name 'y' is not defined");
        assert!(v.is_error);
    }
}
