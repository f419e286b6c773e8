//! What a method body sees while it runs.

use std::fmt::Debug;
use std::panic;

use crate::error::{ProtocolViolation, RunError};
use crate::fixture::Fixture;
use crate::method::{Expected, MethodDescriptor, MethodKind};
use crate::reporter::Reporter;

/// Unwind payload used to leave a method body on a fatal error. Never
/// shows up as a test failure.
pub(crate) struct FatalAbort;

/// Handed to every test and fixture method body.
///
/// Assertions made through the context are numbered, attributed to the
/// enclosing test method and checked against the running method's declared
/// count. Emitting more than declared is flagged the moment it happens;
/// emitting fewer is flagged when the method returns.
pub struct TestContext<'r, 'h> {
    reporter: &'r mut Reporter<'h>,
    fixture: &'r mut Fixture,
    class_fixture: Option<&'r Fixture>,
    class: &'r str,
    method: &'r str,
    running: &'r MethodDescriptor,
    emitted: usize,
    overrun_flagged: bool,
    rest_skipped: bool,
    fatal: Option<RunError>,
}

impl<'r, 'h> TestContext<'r, 'h> {
    pub(crate) fn new(
        reporter: &'r mut Reporter<'h>,
        fixture: &'r mut Fixture,
        class_fixture: Option<&'r Fixture>,
        class: &'r str,
        method: &'r str,
        running: &'r MethodDescriptor,
    ) -> Self {
        TestContext {
            reporter,
            fixture,
            class_fixture,
            class,
            method,
            running,
            emitted: 0,
            overrun_flagged: false,
            rest_skipped: false,
            fatal: None,
        }
    }

    // ── Assertions ───────────────────────────────────────────────────────

    /// Record a pass or a fail. Returns `passed`.
    pub fn ok(&mut self, passed: bool, description: impl Into<String>) -> bool {
        let diagnostic = (!passed).then(|| format!("Failed test '{}'", self.running.name));
        self.emit(passed, description.into(), diagnostic, None);
        passed
    }

    /// Record a failure with an explanation.
    pub fn fail(&mut self, description: impl Into<String>, diagnostic: impl Into<String>) -> bool {
        self.emit(false, description.into(), Some(diagnostic.into()), None);
        false
    }

    /// Compare two values for equality.
    pub fn is<T: PartialEq + Debug>(
        &mut self,
        got: T,
        expected: T,
        description: impl Into<String>,
    ) -> bool {
        if got == expected {
            self.emit(true, description.into(), None, None);
            true
        } else {
            let diagnostic = format!("     got: {:?}\nexpected: {:?}", got, expected);
            self.emit(false, description.into(), Some(diagnostic), None);
            false
        }
    }

    /// Record one skipped assertion. Counts toward the declared total.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.emit(true, String::new(), None, Some(reason.into()));
    }

    /// Skip every assertion the running method still owes. Only meaningful
    /// for methods with an exact count; the body should return right after.
    pub fn skip_rest(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if let Expected::Exact(n) = self.running.expected {
            for _ in self.emitted..n {
                self.emit(true, String::new(), None, Some(reason.clone()));
            }
        }
        self.rest_skipped = true;
    }

    /// Commentary that does not count as an assertion.
    pub fn diag(&mut self, message: impl AsRef<str>) {
        if self.fatal.is_some() {
            return;
        }
        if let Err(e) = self.reporter.diag(message.as_ref()) {
            self.abort(e);
        }
    }

    // ── Fixture access ───────────────────────────────────────────────────

    pub fn fixture(&self) -> &Fixture {
        &*self.fixture
    }

    pub fn fixture_mut(&mut self) -> &mut Fixture {
        &mut *self.fixture
    }

    /// The class-level fixture set up by `setup_for_class` methods. `None`
    /// while a class-level method is itself running, since then
    /// [`fixture_mut`](Self::fixture_mut) already is the class fixture.
    pub fn class_fixture(&self) -> Option<&Fixture> {
        self.class_fixture
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn current_class(&self) -> &str {
        self.class
    }

    /// The test method assertions are attributed to. For class-level
    /// fixtures this is the fixture method itself.
    pub fn current_method(&self) -> &str {
        self.method
    }

    /// The method whose body is executing right now, fixture or test.
    pub fn running_method(&self) -> &str {
        &self.running.name
    }

    pub fn running_kind(&self) -> MethodKind {
        self.running.kind
    }

    /// Assertions emitted by the running method so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn emit(
        &mut self,
        passed: bool,
        description: String,
        diagnostic: Option<String>,
        skip: Option<String>,
    ) {
        if self.fatal.is_some() {
            return;
        }
        if self.running.kind == MethodKind::Test && self.running.expected == Expected::NoTest {
            self.abort(
                ProtocolViolation::AssertionInNoTestMethod {
                    class: self.class.to_string(),
                    method: self.running.name.clone(),
                    description,
                }
                .into(),
            );
        }
        if let Err(e) = self.reporter.emit(passed, description, diagnostic, skip) {
            self.abort(e);
        }
        self.emitted += 1;

        let Some(limit) = self.running.expected.count() else {
            return;
        };
        if self.emitted > limit && !self.overrun_flagged {
            self.overrun_flagged = true;
            tracing::warn!(
                class = self.class,
                method = %self.running.name,
                expected = limit,
                "assertion count exceeded"
            );
            let description = format!(
                "{}->{} emitted more assertions than declared",
                self.class, self.running.name
            );
            let diagnostic = format!(
                "expected {} assertion(s), assertion {} is one too many",
                limit, self.emitted
            );
            if let Err(e) = self.reporter.fail(description, diagnostic) {
                self.abort(e);
            }
        }
    }

    /// Record `error` and unwind straight out of the running body. The
    /// runner recognises the [`FatalAbort`] payload and surfaces `error`.
    fn abort(&mut self, error: RunError) -> ! {
        tracing::debug!(
            class = self.class,
            method = %self.running.name,
            %error,
            "aborting method body"
        );
        self.fatal = Some(error);
        panic::resume_unwind(Box::new(FatalAbort))
    }

    /// Called by the runner once the body has returned. Surfaces a fatal
    /// error raised during the body and checks for an under-count when the
    /// body completed normally.
    pub(crate) fn finish(mut self, completed: bool) -> Result<(), RunError> {
        if let Some(fatal) = self.fatal.take() {
            return Err(fatal);
        }
        if !completed || self.rest_skipped {
            return Ok(());
        }
        if let Some(limit) = self.running.expected.count() {
            if self.emitted < limit {
                tracing::warn!(
                    class = self.class,
                    method = %self.running.name,
                    expected = limit,
                    emitted = self.emitted,
                    "assertion count short"
                );
                self.reporter.fail(
                    format!(
                        "{}->{} emitted fewer assertions than declared",
                        self.class, self.running.name
                    ),
                    format!(
                        "expected {} assertion(s), {} completed",
                        limit, self.emitted
                    ),
                )?;
            }
        }
        Ok(())
    }
}
