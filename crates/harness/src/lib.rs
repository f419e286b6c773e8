//! Assertion-counting protocol consumed by the classtap engine.
//!
//! The engine never formats output itself. It announces a plan, forwards
//! one [`AssertionRecord`] per assertion, and closes with a summary when no
//! plan could be announced upfront. Anything implementing [`Harness`] can
//! sit on the other side:
//!
//! - [`TapWriter`] streams TAP version 14 to any `io::Write`
//! - [`RecordingHarness`] keeps everything in memory for inspection

mod record;
mod tap;

use std::io;

use serde::Serialize;

pub use record::RecordingHarness;
pub use tap::TapWriter;

/// One assertion as it crosses the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionRecord {
    /// 1-based, run-wide, strictly increasing.
    pub sequence: usize,
    pub passed: bool,
    pub description: String,
    /// Human-readable explanation, usually only present on failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Reason for a `# SKIP` directive. Skipped assertions count as passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
}

impl AssertionRecord {
    pub fn pass(sequence: usize, description: impl Into<String>) -> Self {
        AssertionRecord {
            sequence,
            passed: true,
            description: description.into(),
            diagnostic: None,
            skip: None,
        }
    }

    pub fn fail(
        sequence: usize,
        description: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> Self {
        AssertionRecord {
            sequence,
            passed: false,
            description: description.into(),
            diagnostic: Some(diagnostic.into()),
            skip: None,
        }
    }

    pub fn skipped(sequence: usize, reason: impl Into<String>) -> Self {
        AssertionRecord {
            sequence,
            passed: true,
            description: String::new(),
            diagnostic: None,
            skip: Some(reason.into()),
        }
    }
}

/// The low-level collaborator the engine reports through.
///
/// Call order guaranteed by the engine:
///
/// 1. `plan` at most once, before any assertion, and only when the total
///    is known upfront
/// 2. `assertion` once per assertion, in strictly increasing sequence order,
///    interleaved with any number of `diag` calls
/// 3. `summary` once at the end, only when `plan` was not called. A run
///    that aborts on a fatal error stops without calling it.
pub trait Harness {
    fn plan(&mut self, count: usize) -> io::Result<()>;

    fn assertion(&mut self, record: &AssertionRecord) -> io::Result<()>;

    /// Free-form commentary that does not count as an assertion.
    fn diag(&mut self, message: &str) -> io::Result<()>;

    fn summary(&mut self, count: usize) -> io::Result<()>;
}

impl<H: Harness + ?Sized> Harness for &mut H {
    fn plan(&mut self, count: usize) -> io::Result<()> {
        (**self).plan(count)
    }

    fn assertion(&mut self, record: &AssertionRecord) -> io::Result<()> {
        (**self).assertion(record)
    }

    fn diag(&mut self, message: &str) -> io::Result<()> {
        (**self).diag(message)
    }

    fn summary(&mut self, count: usize) -> io::Result<()> {
        (**self).summary(count)
    }
}
