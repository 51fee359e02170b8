//! Failure ledger.
//!
//! Turns probe outcomes into ban decisions. The transition is a pure function
//! of the previous state, the check result, the policy and the current time.

use crate::config::FailuresBeforeBan;
use crate::health::state::{BanState, CheckResult, EndpointState};

/// Thresholds for banning an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Failures within the window that trigger a ban.
    pub count: usize,
    pub window_ms: u64,
    /// Failures closer together than this count once.
    pub throttle_ms: u64,
}

impl From<FailuresBeforeBan> for FailurePolicy {
    fn from(cfg: FailuresBeforeBan) -> Self {
        Self {
            count: cfg.count,
            window_ms: cfg.window_ms,
            throttle_ms: cfg.throttle_ms,
        }
    }
}

/// What a ledger update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    FailureCounted { failures: usize },
    FailureCoalesced,
    Banned { reason: String },
    Unbanned,
}

/// New state plus the transition that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub state: EndpointState,
    pub transition: Transition,
}

/// Apply one check result to an endpoint's state.
pub fn next_state<S>(
    state: &EndpointState,
    result: &CheckResult<S>,
    policy: &FailurePolicy,
    now: u64,
) -> LedgerUpdate {
    let mut next = state.clone();
    next.prune(now, policy.window_ms);

    let transition = match (&next.ban, result.success) {
        (BanState::Banned { .. }, true) => {
            next.ban = BanState::Active;
            next.failure_timestamps.clear();
            next.failure_throttle_until = None;
            Transition::Unbanned
        }
        (BanState::Banned { .. }, false) | (BanState::Active, true) => Transition::Unchanged,
        (BanState::Active, false) => {
            if next.failure_throttle_until.is_some_and(|until| now < until) {
                Transition::FailureCoalesced
            } else {
                next.failure_timestamps.push(now);
                next.failure_throttle_until =
                    (policy.throttle_ms > 0).then(|| now + policy.throttle_ms);

                let failures = next.failure_timestamps.len();
                if failures >= policy.count {
                    let reason = ban_reason(result, failures, policy);
                    next.ban = BanState::Banned {
                        timestamp: now,
                        reason: reason.clone(),
                    };
                    Transition::Banned { reason }
                } else {
                    Transition::FailureCounted { failures }
                }
            }
        }
    };

    LedgerUpdate {
        state: next,
        transition,
    }
}

fn ban_reason<S>(result: &CheckResult<S>, failures: usize, policy: &FailurePolicy) -> String {
    let cause = match &result.error {
        Some(err) => format!("{}: {}", err.class(), err),
        None => "check failed".to_string(),
    };
    format!("{} failures within {} ms, last {}", failures, policy.window_ms, cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;

    const EP: &str = "https://a.example";

    fn policy(count: usize, window_ms: u64, throttle_ms: u64) -> FailurePolicy {
        FailurePolicy { count, window_ms, throttle_ms }
    }

    fn fail(at: u64) -> CheckResult<()> {
        CheckResult::failure(EP, ProbeError::Transport("connection refused".into()), at, 5)
    }

    fn ok(at: u64) -> CheckResult<()> {
        CheckResult::success(EP, (), at, 5)
    }

    fn run(state: EndpointState, results: &[CheckResult<()>], policy: &FailurePolicy) -> (EndpointState, Vec<Transition>) {
        let mut state = state;
        let mut transitions = Vec::new();
        for r in results {
            let update = next_state(&state, r, policy, r.checked_at);
            state = update.state;
            transitions.push(update.transition);
        }
        (state, transitions)
    }

    #[test]
    fn test_three_failures_ban() {
        let p = policy(3, 60_000, 0);
        let (state, transitions) = run(EndpointState::new(EP), &[fail(0), fail(1_000), fail(2_000)], &p);

        assert_eq!(transitions[0], Transition::FailureCounted { failures: 1 });
        assert_eq!(transitions[1], Transition::FailureCounted { failures: 2 });
        assert!(matches!(transitions[2], Transition::Banned { .. }));
        match state.ban {
            BanState::Banned { timestamp, ref reason } => {
                assert_eq!(timestamp, 2_000);
                assert!(reason.contains("transport"));
            }
            BanState::Active => panic!("endpoint should be banned"),
        }
    }

    #[test]
    fn test_throttle_coalesces_bursts() {
        let p = policy(3, 60_000, 2_000);
        let (state, transitions) = run(EndpointState::new(EP), &[fail(0), fail(500), fail(1_999)], &p);

        assert_eq!(state.failure_timestamps, vec![0]);
        assert_eq!(transitions[1], Transition::FailureCoalesced);
        assert_eq!(transitions[2], Transition::FailureCoalesced);
        assert!(!state.is_banned());

        // Spacing of exactly the throttle counts again.
        let update = next_state(&state, &fail(2_000), &p, 2_000);
        assert_eq!(update.transition, Transition::FailureCounted { failures: 2 });
    }

    #[test]
    fn test_old_failures_leave_window() {
        let p = policy(3, 10_000, 0);
        let (state, _) = run(EndpointState::new(EP), &[fail(0), fail(1_000), fail(20_000)], &p);

        assert!(!state.is_banned());
        assert_eq!(state.failure_timestamps, vec![20_000]);
        assert!(state.failure_timestamps.iter().all(|&ts| 20_000 - ts <= 10_000));
    }

    #[test]
    fn test_success_keeps_history_while_active() {
        let p = policy(3, 60_000, 0);
        let (state, transitions) = run(EndpointState::new(EP), &[fail(0), ok(1_000), fail(2_000)], &p);

        assert_eq!(transitions[1], Transition::Unchanged);
        assert_eq!(state.failure_timestamps, vec![0, 2_000]);
    }

    #[test]
    fn test_success_unbans_and_resets() {
        let p = policy(2, 60_000, 1_000);
        let (banned, _) = run(EndpointState::new(EP), &[fail(0), fail(1_000)], &p);
        assert!(banned.is_banned());

        // Further failures while banned change nothing.
        let still = next_state(&banned, &fail(2_000), &p, 2_000);
        assert_eq!(still.transition, Transition::Unchanged);
        assert_eq!(still.state, banned);

        let update = next_state(&banned, &ok(3_000), &p, 3_000);
        assert_eq!(update.transition, Transition::Unbanned);
        assert_eq!(update.state.ban, BanState::Active);
        assert!(update.state.failure_timestamps.is_empty());
        assert_eq!(update.state.failure_throttle_until, None);
    }

    #[test]
    fn test_deterministic() {
        let p = policy(3, 60_000, 500);
        let state = EndpointState::new(EP);
        let a = next_state(&state, &fail(100), &p, 100);
        let b = next_state(&state, &fail(100), &p, 100);
        assert_eq!(a, b);
        assert_eq!(a.state.failure_throttle_until, Some(600));
    }
}
