//! Run results and their rendering.

use std::fmt;

use rdv_target::SuspendPolicy;
use serde::Serialize;
use smol_str::SmolStr;

use crate::snapshot::SuspendCountTable;
use crate::verify::{CheckOutcome, Violation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
        })
    }
}

/// One executed scenario case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub index: usize,
    pub tag: SmolStr,
    /// Policy the case installed its request with.
    pub policy: SuspendPolicy,
    /// Policy the received group actually carried.
    pub group_policy: SuspendPolicy,
    pub event_thread: SmolStr,
    pub before: SuspendCountTable,
    pub after: SuspendCountTable,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub cases: Vec<CaseReport>,
    /// Error that aborted the run.
    pub fatal: Option<String>,
    pub exit_status: Option<i32>,
    pub expected_exit_status: i32,
}

impl RunReport {
    #[must_use]
    pub fn new(expected_exit_status: i32) -> Self {
        Self {
            cases: Vec::new(),
            fatal: None,
            exit_status: None,
            expected_exit_status,
        }
    }

    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.cases.iter().flat_map(|case| case.outcome.violations())
    }

    #[must_use]
    pub fn verdict(&self) -> Verdict {
        let clean = self.fatal.is_none()
            && self.violations().next().is_none()
            && self.exit_status == Some(self.expected_exit_status);
        if clean {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }

    /// Pretty JSON including the verdict.
    pub fn to_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            verdict: Verdict,
            #[serde(flatten)]
            report: &'a RunReport,
        }
        serde_json::to_string_pretty(&Document {
            verdict: self.verdict(),
            report: self,
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for case in &self.cases {
            write!(f, "case {} {} {}", case.index, case.tag, case.policy)?;
            if case.group_policy != case.policy {
                write!(f, " (group {})", case.group_policy)?;
            }
            f.write_str(": ")?;
            match &case.outcome {
                CheckOutcome::Passed => writeln!(f, "passed")?,
                CheckOutcome::Skipped { reason } => writeln!(f, "skipped ({reason})")?,
                CheckOutcome::Violated { violations } => {
                    writeln!(f, "{} violation(s)", violations.len())?;
                    for violation in violations {
                        writeln!(f, "  {violation}")?;
                    }
                }
            }
        }
        if let Some(fatal) = &self.fatal {
            writeln!(f, "fatal: {fatal}")?;
        }
        match self.exit_status {
            Some(status) => writeln!(
                f,
                "exit status: {status} (expected {})",
                self.expected_exit_status
            )?,
            None => writeln!(f, "exit status: none")?,
        }
        write!(f, "verdict: {}", self.verdict())
    }
}
