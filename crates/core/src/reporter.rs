//! Result Reporter Adapter.
//!
//! The only place that touches the harness and the only owner of the
//! run-wide sequence counter. It never judges pass or fail; it numbers,
//! attributes and forwards what the method bodies decided.

use classtap_harness::{AssertionRecord, Harness};

use crate::error::{ProtocolViolation, RunError};
use crate::plan::PlanTotal;
use crate::report::{ExecutionResult, InvocationSummary, RunReport};

pub struct Reporter<'h> {
    harness: &'h mut dyn Harness,
    next_sequence: usize,
    failed: usize,
    planned: PlanTotal,
    active: Option<(String, String)>,
    finished: bool,
    results: Vec<ExecutionResult>,
}

impl<'h> Reporter<'h> {
    pub fn new(harness: &'h mut dyn Harness) -> Self {
        Reporter {
            harness,
            next_sequence: 1,
            failed: 0,
            planned: PlanTotal::Indeterminate,
            active: None,
            finished: false,
            results: Vec::new(),
        }
    }

    /// Announce the plan if it is known. Must precede every assertion.
    pub fn announce(&mut self, total: PlanTotal) -> Result<(), RunError> {
        self.planned = total;
        match total {
            PlanTotal::Exact(n) => {
                tracing::info!(planned = n, "plan announced");
                self.harness.plan(n)?;
            }
            PlanTotal::Indeterminate => {
                tracing::info!("indeterminate plan, deferring count to the summary");
            }
        }
        Ok(())
    }

    /// Attribute subsequent assertions to `method` of `class`.
    pub fn enter(&mut self, class: &str, method: &str) {
        self.active = Some((class.to_string(), method.to_string()));
    }

    pub fn leave(&mut self) {
        self.active = None;
    }

    /// Number of assertions emitted so far.
    pub fn emitted(&self) -> usize {
        self.next_sequence - 1
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn diag(&mut self, message: &str) -> Result<(), RunError> {
        self.harness.diag(message)?;
        Ok(())
    }

    pub fn pass(&mut self, description: impl Into<String>) -> Result<usize, RunError> {
        self.emit(true, description.into(), None, None)
    }

    pub fn fail(
        &mut self,
        description: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Result<usize, RunError> {
        self.emit(false, description.into(), Some(diagnostic.into()), None)
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<usize, RunError> {
        self.emit(true, String::new(), None, Some(reason.into()))
    }

    /// Number, attribute and forward one assertion. Returns its sequence.
    pub fn emit(
        &mut self,
        passed: bool,
        description: String,
        diagnostic: Option<String>,
        skip: Option<String>,
    ) -> Result<usize, RunError> {
        if self.finished {
            return Err(ProtocolViolation::AssertionAfterSummary { description }.into());
        }
        let Some((class, method)) = self.active.clone() else {
            return Err(ProtocolViolation::AssertionOutsideMethod { description }.into());
        };

        let record = AssertionRecord {
            sequence: self.next_sequence,
            passed,
            description,
            diagnostic,
            skip,
        };
        self.harness.assertion(&record)?;
        self.next_sequence += 1;
        if !passed {
            self.failed += 1;
        }

        let sequence = record.sequence;
        self.results.push(ExecutionResult {
            class,
            method,
            record,
        });
        Ok(sequence)
    }

    /// Close the stream: emit the trailing summary when no plan was
    /// announced, and hand back everything that was recorded.
    pub fn finish(&mut self, invocations: Vec<InvocationSummary>) -> Result<RunReport, RunError> {
        self.active = None;
        if self.planned == PlanTotal::Indeterminate {
            self.harness.summary(self.emitted())?;
        }
        self.finished = true;

        let report = RunReport {
            planned: self.planned,
            results: std::mem::take(&mut self.results),
            invocations,
        };
        tracing::info!(
            ran = report.total(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }
}
