//! Run results: the flat assertion stream plus per-invocation summaries.

use std::fmt;

use classtap_harness::AssertionRecord;
use serde::Serialize;

use crate::plan::PlanTotal;

/// One assertion with the (class, test method) it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub class: String,
    pub method: String,
    #[serde(flatten)]
    pub record: AssertionRecord,
}

/// Lifecycle of a single test method invocation.
///
/// `Pending → SetupRunning → TestRunning → TeardownRunning → Done`, or
/// `AbortedByFixtureFailure` when a setup or teardown method failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Pending,
    SetupRunning,
    TestRunning,
    TeardownRunning,
    Done,
    AbortedByFixtureFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationSummary {
    pub class: String,
    pub method: String,
    /// Terminal state. `Pending` means the method never started, which only
    /// happens when its class-level setup failed.
    pub state: InvocationState,
    pub assertions: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAssertion {
    pub class: String,
    pub method: String,
    pub sequence: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    Failure {
        failed: Vec<FailedAssertion>,
        planned: Option<usize>,
        ran: usize,
    },
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Process exit code: the number of failed assertions capped at 254,
    /// or 255 when every assertion passed but the count missed the plan.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure { failed, .. } if !failed.is_empty() => {
                failed.len().min(254) as i32
            }
            ExitStatus::Failure { .. } => 255,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub planned: PlanTotal,
    pub results: Vec<ExecutionResult>,
    pub invocations: Vec<InvocationSummary>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.record.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.record.passed)
    }

    /// Results attributed to one test method, in sequence order.
    pub fn results_for<'a>(
        &'a self,
        class: &'a str,
        method: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionResult> {
        self.results
            .iter()
            .filter(move |r| r.class == class && r.method == method)
    }

    pub fn invocation(&self, class: &str, method: &str) -> Option<&InvocationSummary> {
        self.invocations
            .iter()
            .find(|i| i.class == class && i.method == method)
    }

    /// Success only if every assertion passed and, when a plan was
    /// announced, exactly that many assertions ran.
    pub fn exit_status(&self) -> ExitStatus {
        let planned = self.planned.exact();
        let count_ok = planned.map_or(true, |n| n == self.total());
        let failed: Vec<FailedAssertion> = self
            .failures()
            .map(|r| FailedAssertion {
                class: r.class.clone(),
                method: r.method.clone(),
                sequence: r.record.sequence,
            })
            .collect();

        if failed.is_empty() && count_ok {
            ExitStatus::Success
        } else {
            ExitStatus::Failure {
                failed,
                planned,
                ran: self.total(),
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.planned {
            PlanTotal::Exact(n) => writeln!(
                f,
                "Run: {}/{} passed ({} failed, {} planned)",
                self.passed(),
                self.total(),
                self.failed(),
                n
            )?,
            PlanTotal::Indeterminate => writeln!(
                f,
                "Run: {}/{} passed ({} failed, no plan)",
                self.passed(),
                self.total(),
                self.failed()
            )?,
        }
        for r in self.failures() {
            writeln!(
                f,
                "  FAIL #{} [{}->{}]: {}",
                r.record.sequence, r.class, r.method, r.record.description
            )?;
            if let Some(diag) = &r.record.diagnostic {
                for line in diag.lines() {
                    writeln!(f, "      {}", line)?;
                }
            }
        }
        Ok(())
    }
}
