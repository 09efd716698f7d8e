//! Trust policy: combining the provider's interpretation with local
//! classification.

use crate::config::TrustPolicy;
use crate::executor::{ExecutionResult, ExitClass};
use crate::protocol::Interpretation;

/// Final judgement on one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub success: bool,
    /// Retrying or fixing cannot help.
    pub permanent: bool,
    pub failure_category: Option<String>,
    /// Human-readable summary, when the provider gave one.
    pub answer: Option<String>,
}

/// Judge an execution.
///
/// Timeouts, cancellations, credential aborts and transport errors are never
/// successes. Otherwise `ProviderPreferred` lets an available interpretation
/// decide and falls back to the classifier, while `Conservative` requires
/// both to agree.
pub fn assess(
    policy: TrustPolicy,
    result: &ExecutionResult,
    interpretation: Option<&Interpretation>,
) -> Assessment {
    let answer = interpretation
        .map(|i| i.answer.trim().to_string())
        .filter(|a| !a.is_empty());

    let completed = matches!(result.exit, ExitClass::Success | ExitClass::Error);
    let success = completed
        && match (policy, interpretation) {
            (_, None) => result.ok,
            (TrustPolicy::ProviderPreferred, Some(i)) => i.success,
            (TrustPolicy::Conservative, Some(i)) => i.success && result.ok,
        };

    // Only the provider can declare a failure permanent
    let permanent = !success && interpretation.map(|i| i.permanent_failure).unwrap_or(false);
    let failure_category = if permanent {
        interpretation.and_then(|i| i.failure_category.clone())
    } else {
        None
    };

    Assessment {
        success,
        permanent,
        failure_category,
        answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Verdict;
    use std::time::Duration;

    fn result(exit: ExitClass) -> ExecutionResult {
        ExecutionResult {
            command: "true".to_string(),
            ok: exit == ExitClass::Success,
            exit,
            raw_output: String::new(),
            clean_output: String::new(),
            timed_out: exit == ExitClass::TimedOut,
            error: None,
            verdict: Verdict::default(),
            interactive_responses: 0,
            duration: Duration::ZERO,
        }
    }

    fn interp(success: bool, permanent: bool) -> Interpretation {
        Interpretation {
            success,
            answer: "summary".to_string(),
            permanent_failure: permanent,
            failure_category: permanent.then(|| "os_incompatible".to_string()),
        }
    }

    #[test]
    fn test_provider_preferred_trusts_interpretation() {
        let policy = TrustPolicy::ProviderPreferred;
        assert!(assess(policy, &result(ExitClass::Error), Some(&interp(true, false))).success);
        assert!(!assess(policy, &result(ExitClass::Success), Some(&interp(false, false))).success);
        assert!(assess(policy, &result(ExitClass::Success), None).success);
        assert!(!assess(policy, &result(ExitClass::Error), None).success);
    }

    #[test]
    fn test_conservative_requires_agreement() {
        let policy = TrustPolicy::Conservative;
        assert!(!assess(policy, &result(ExitClass::Error), Some(&interp(true, false))).success);
        assert!(assess(policy, &result(ExitClass::Success), Some(&interp(true, false))).success);
    }

    #[test]
    fn test_unfinished_executions_never_succeed() {
        for exit in [
            ExitClass::TimedOut,
            ExitClass::Cancelled,
            ExitClass::CredentialRequired,
            ExitClass::TransportError,
        ] {
            let a = assess(TrustPolicy::ProviderPreferred, &result(exit), Some(&interp(true, false)));
            assert!(!a.success, "{:?}", exit);
        }
    }

    #[test]
    fn test_permanent_failure_category() {
        let a = assess(
            TrustPolicy::ProviderPreferred,
            &result(ExitClass::Error),
            Some(&interp(false, true)),
        );
        assert!(a.permanent);
        assert_eq!(a.failure_category.as_deref(), Some("os_incompatible"));
        assert_eq!(a.answer.as_deref(), Some("summary"));
    }
}
