//! Test Runner.
//!
//! Drives a [`RunPlan`] strictly sequentially. For each class:
//!
//! 1. run the class-level setup chain on a fresh class fixture
//! 2. for each test method: fresh fixture, setup chain, body, teardown chain
//! 3. run the class-level teardown chain
//!
//! Any failure inside a body, whether an `Err` return or a panic, becomes a
//! failing assertion and the run moves on. A failed setup skips the test
//! body but not the teardown chain. Teardown is best-effort: every teardown
//! method runs even if an earlier one failed. Only a fatal [`RunError`]
//! stops the run, and it stops the offending method body on the spot.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use classtap_harness::Harness;

use crate::config::RunConfig;
use crate::context::{FatalAbort, TestContext};
use crate::error::RunError;
use crate::fixture::Fixture;
use crate::plan::{PlannedClass, PlannedInvocation, RunPlan};
use crate::registry::{ResolvedMethod, Suite};
use crate::report::{ExitStatus, InvocationState, InvocationSummary, RunReport};
use crate::reporter::Reporter;

/// How a single method body ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

impl Suite {
    /// Plan and execute a run, reporting through `harness`.
    ///
    /// Returns `Err` only for fatal conditions; test failures are in the
    /// report. On `Err` the harness has already seen a partial stream.
    pub fn run(&self, config: &RunConfig, harness: &mut dyn Harness) -> Result<RunReport, RunError> {
        let selection = config.selection()?;
        let plan = RunPlan::build(self, &selection)?;
        Runner::new(harness, selection.verbose).run(&plan)
    }

    pub fn build_plan_and_run(
        &self,
        config: &RunConfig,
        harness: &mut dyn Harness,
    ) -> Result<ExitStatus, RunError> {
        self.run(config, harness).map(|report| report.exit_status())
    }
}

pub struct Runner<'h> {
    reporter: Reporter<'h>,
    verbose: bool,
    invocations: Vec<InvocationSummary>,
}

impl<'h> Runner<'h> {
    pub fn new(harness: &'h mut dyn Harness, verbose: bool) -> Self {
        Runner {
            reporter: Reporter::new(harness),
            verbose,
            invocations: Vec::new(),
        }
    }

    pub fn run(mut self, plan: &RunPlan<'_>) -> Result<RunReport, RunError> {
        self.reporter.announce(plan.total())?;

        for class in plan.skipped() {
            self.reporter.diag(&format!(
                "skipping {}: {}",
                class.name(),
                class.skip_reason().unwrap_or_default()
            ))?;
        }

        for class in plan.classes() {
            self.run_class(class)?;
        }

        let invocations = std::mem::take(&mut self.invocations);
        self.reporter.finish(invocations)
    }

    fn run_class(&mut self, planned: &PlannedClass<'_>) -> Result<(), RunError> {
        let class = planned.class.name();
        let _span = tracing::debug_span!("class", class).entered();
        let mut class_fixture = Fixture::new();

        let mut startup_failed = false;
        for method in &planned.class_chain.setup {
            self.reporter.enter(class, method.name());
            let outcome = self.invoke(class, method.name(), method, &mut class_fixture, None)?;
            if let Outcome::Failed(diag) = outcome {
                tracing::warn!(class, method = method.name(), "class setup failed");
                self.reporter.fail(
                    format!("{}->{} failed, no test methods run", class, method.name()),
                    diag,
                )?;
                startup_failed = true;
            }
            self.reporter.leave();
            if startup_failed {
                break;
            }
        }

        if startup_failed {
            for invocation in &planned.invocations {
                self.invocations.push(InvocationSummary {
                    class: class.to_string(),
                    method: invocation.method.name().to_string(),
                    state: InvocationState::Pending,
                    assertions: 0,
                    failed: 0,
                });
            }
        } else {
            for invocation in &planned.invocations {
                self.run_invocation(class, invocation, &class_fixture)?;
            }
        }

        for method in &planned.class_chain.teardown {
            self.reporter.enter(class, method.name());
            let outcome = self.invoke(class, method.name(), method, &mut class_fixture, None)?;
            if let Outcome::Failed(diag) = outcome {
                tracing::warn!(class, method = method.name(), "class teardown failed");
                self.reporter
                    .fail(format!("{}->{} failed", class, method.name()), diag)?;
            }
            self.reporter.leave();
        }
        Ok(())
    }

    fn run_invocation(
        &mut self,
        class: &str,
        planned: &PlannedInvocation<'_>,
        class_fixture: &Fixture,
    ) -> Result<(), RunError> {
        let method = planned.method.name();
        let emitted_before = self.reporter.emitted();
        let failed_before = self.reporter.failed();
        let mut state = InvocationState::Pending;
        let mut fixture = Fixture::new();

        self.reporter.enter(class, method);
        if self.verbose {
            self.reporter.diag(&format!("{}->{}", class, method))?;
        }

        advance(&mut state, InvocationState::SetupRunning, class, method);
        let mut fixture_failed = false;
        for setup in &planned.chain.setup {
            let outcome = self.invoke(class, method, setup, &mut fixture, Some(class_fixture))?;
            if let Outcome::Failed(diag) = outcome {
                tracing::warn!(class, method, setup = setup.name(), "setup failed");
                self.reporter.fail(
                    format!("{}->{} not run: setup {} failed", class, method, setup.name()),
                    diag,
                )?;
                fixture_failed = true;
                break;
            }
        }

        if !fixture_failed {
            advance(&mut state, InvocationState::TestRunning, class, method);
            let outcome =
                self.invoke(class, method, planned.method, &mut fixture, Some(class_fixture))?;
            if let Outcome::Failed(diag) = outcome {
                self.reporter
                    .fail(format!("{}->{} died", class, method), diag)?;
            }
        }

        advance(&mut state, InvocationState::TeardownRunning, class, method);
        for teardown in &planned.chain.teardown {
            let outcome = self.invoke(class, method, teardown, &mut fixture, Some(class_fixture))?;
            if let Outcome::Failed(diag) = outcome {
                tracing::warn!(class, method, teardown = teardown.name(), "teardown failed");
                self.reporter.fail(
                    format!("{}->{}: teardown {} failed", class, method, teardown.name()),
                    diag,
                )?;
                fixture_failed = true;
            }
        }
        drop(fixture);

        let terminal = if fixture_failed {
            InvocationState::AbortedByFixtureFailure
        } else {
            InvocationState::Done
        };
        advance(&mut state, terminal, class, method);
        self.reporter.leave();

        self.invocations.push(InvocationSummary {
            class: class.to_string(),
            method: method.to_string(),
            state,
            assertions: self.reporter.emitted() - emitted_before,
            failed: self.reporter.failed() - failed_before,
        });
        Ok(())
    }

    /// Run one method body with panics contained.
    fn invoke(
        &mut self,
        class: &str,
        attributed_to: &str,
        method: &ResolvedMethod,
        fixture: &mut Fixture,
        class_fixture: Option<&Fixture>,
    ) -> Result<Outcome, RunError> {
        let descriptor = method.descriptor();
        let mut cx = TestContext::new(
            &mut self.reporter,
            fixture,
            class_fixture,
            class,
            attributed_to,
            descriptor,
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| (descriptor.body)(&mut cx)));
        let outcome = match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(diag)) => Outcome::Failed(diag),
            Err(payload) if (*payload).is::<FatalAbort>() => {
                Outcome::Failed("aborted by a fatal error".to_string())
            }
            Err(payload) => Outcome::Failed(panic_message(payload.as_ref())),
        };

        // surfaces the fatal error behind a FatalAbort unwind
        cx.finish(outcome == Outcome::Completed)?;
        Ok(outcome)
    }
}

fn advance(state: &mut InvocationState, next: InvocationState, class: &str, method: &str) {
    tracing::debug!(class, method, from = ?*state, to = ?next, "invocation state");
    *state = next;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked with a non-string payload".to_string()
    }
}
