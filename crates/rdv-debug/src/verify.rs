//! Release verification: compares the counts taken before and after a group
//! release against the group's suspend policy.
//!
//! Pure over the two tables; never touches the target.

use std::fmt;

use rdv_target::SuspendPolicy;
use serde::Serialize;
use smol_str::SmolStr;
use tracing::debug;

use crate::snapshot::SuspendCountTable;

/// A recorded, non-fatal check failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The release changed a thread's count by the wrong amount.
    SuspendCountMismatch {
        thread: SmolStr,
        before: u32,
        after: u32,
        expected_after: i64,
    },
    /// A thread present before the release is gone after it.
    MissingThread { thread: SmolStr },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SuspendCountMismatch {
                thread,
                before,
                after,
                expected_after,
            } => write!(
                f,
                "suspend counts don't match for '{thread}': before release {before}, \
                 after release {after}, expected {expected_after}"
            ),
            Violation::MissingThread { thread } => {
                write!(f, "thread '{thread}' missing from the post-release snapshot")
            }
        }
    }
}

/// Result of one release check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Violated { violations: Vec<Violation> },
    Skipped { reason: SmolStr },
}

impl CheckOutcome {
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            CheckOutcome::Violated { violations } => violations,
            CheckOutcome::Passed | CheckOutcome::Skipped { .. } => &[],
        }
    }
}

/// What the released group looked like.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseCheck<'a> {
    pub policy: SuspendPolicy,
    /// Thread that raised the group's event.
    pub event_thread: &'a str,
    /// The event came from the request installed for the current case.
    pub request_under_test: bool,
}

/// Compare `before` and `after` under the group's policy.
#[must_use]
pub fn verify_release(
    before: &SuspendCountTable,
    after: &SuspendCountTable,
    check: &ReleaseCheck<'_>,
) -> CheckOutcome {
    if check.policy == SuspendPolicy::All && !check.request_under_test {
        return CheckOutcome::Skipped {
            reason: SmolStr::new("event was not raised by the request under test"),
        };
    }

    let mut violations = Vec::new();
    for snapshot in before.iter() {
        let Some(released) = after.get(&snapshot.name) else {
            violations.push(Violation::MissingThread {
                thread: snapshot.name.clone(),
            });
            continue;
        };
        let decrement = match check.policy {
            SuspendPolicy::None => 0,
            SuspendPolicy::EventThread if snapshot.name == check.event_thread => 1,
            SuspendPolicy::EventThread => 0,
            SuspendPolicy::All => 1,
        };
        let expected_after = i64::from(snapshot.suspend_count) - decrement;
        debug!(
            thread = %snapshot.name,
            before = snapshot.suspend_count,
            after = released.suspend_count,
            expected_after,
            "checking release"
        );
        if i64::from(released.suspend_count) != expected_after {
            violations.push(Violation::SuspendCountMismatch {
                thread: snapshot.name.clone(),
                before: snapshot.suspend_count,
                after: released.suspend_count,
                expected_after,
            });
        }
    }

    if violations.is_empty() {
        CheckOutcome::Passed
    } else {
        CheckOutcome::Violated { violations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(policy: SuspendPolicy) -> ReleaseCheck<'static> {
        ReleaseCheck {
            policy,
            event_thread: "main",
            request_under_test: true,
        }
    }

    #[test]
    fn none_policy_requires_unchanged_counts() {
        let before = SuspendCountTable::from_counts([("main", 1), ("worker1", 1)]);
        assert_eq!(
            verify_release(&before, &before, &check(SuspendPolicy::None)),
            CheckOutcome::Passed
        );

        let after = SuspendCountTable::from_counts([("main", 0), ("worker1", 1)]);
        assert_eq!(
            verify_release(&before, &after, &check(SuspendPolicy::None)).violations(),
            &[Violation::SuspendCountMismatch {
                thread: "main".into(),
                before: 1,
                after: 0,
                expected_after: 1,
            }]
        );
    }

    #[test]
    fn event_thread_policy_releases_only_the_event_thread() {
        let before = SuspendCountTable::from_counts([("main", 2), ("worker1", 1)]);
        let after = SuspendCountTable::from_counts([("main", 1), ("worker1", 1)]);
        assert_eq!(
            verify_release(&before, &after, &check(SuspendPolicy::EventThread)),
            CheckOutcome::Passed
        );

        let over_released = SuspendCountTable::from_counts([("main", 1), ("worker1", 0)]);
        let outcome = verify_release(&before, &over_released, &check(SuspendPolicy::EventThread));
        assert_eq!(outcome.violations().len(), 1);
        assert!(matches!(
            &outcome.violations()[0],
            Violation::SuspendCountMismatch { thread, .. } if thread == "worker1"
        ));
    }

    #[test]
    fn all_policy_flags_a_thread_left_suspended() {
        let before = SuspendCountTable::from_counts([("main", 2), ("worker1", 2), ("worker2", 2)]);
        let after = SuspendCountTable::from_counts([("main", 1), ("worker1", 1), ("worker2", 2)]);
        assert_eq!(
            verify_release(&before, &after, &check(SuspendPolicy::All)),
            CheckOutcome::Violated {
                violations: vec![Violation::SuspendCountMismatch {
                    thread: "worker2".into(),
                    before: 2,
                    after: 2,
                    expected_after: 1,
                }],
            }
        );
    }

    #[test]
    fn all_policy_is_skipped_for_foreign_requests() {
        let before = SuspendCountTable::from_counts([("main", 2)]);
        let after = SuspendCountTable::from_counts([("main", 2)]);
        let outcome = verify_release(
            &before,
            &after,
            &ReleaseCheck {
                request_under_test: false,
                ..check(SuspendPolicy::All)
            },
        );
        assert!(matches!(outcome, CheckOutcome::Skipped { .. }));
    }

    #[test]
    fn every_violation_is_reported() {
        let before = SuspendCountTable::from_counts([("main", 2), ("worker1", 2), ("worker2", 2)]);
        let after = SuspendCountTable::from_counts([("main", 2), ("worker1", 1)]);
        let outcome = verify_release(&before, &after, &check(SuspendPolicy::All));
        assert_eq!(
            outcome.violations(),
            &[
                Violation::SuspendCountMismatch {
                    thread: "main".into(),
                    before: 2,
                    after: 2,
                    expected_after: 1,
                },
                Violation::MissingThread {
                    thread: "worker2".into(),
                },
            ]
        );
    }

    #[test]
    fn repeated_verification_gives_the_same_outcome() {
        let before = SuspendCountTable::from_counts([("main", 2), ("worker1", 2)]);
        let after = SuspendCountTable::from_counts([("main", 1), ("worker1", 2)]);
        let first = verify_release(&before, &after, &check(SuspendPolicy::All));
        let second = verify_release(&before, &after, &check(SuspendPolicy::All));
        assert_eq!(first, second);
    }
}
