//! Plan Calculator.
//!
//! Selects classes and test methods, fixes their execution order, attaches
//! fixture chains and sums the expected assertion counts. The result is
//! computed once, before anything runs, and never changes during the run.
//!
//! A test method contributes its own count plus the counts of every fixture
//! method in its chain. Class-level fixtures contribute once per class. A
//! single indeterminate method anywhere in the run makes the whole total
//! indeterminate.

use std::collections::HashSet;

use serde::Serialize;

use crate::chain::FixtureChain;
use crate::config::{ClassOrder, Selection};
use crate::error::RegistrationError;
use crate::registry::{ResolvedClass, ResolvedMethod, Suite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTotal {
    Exact(usize),
    Indeterminate,
}

impl PlanTotal {
    pub fn exact(&self) -> Option<usize> {
        match self {
            PlanTotal::Exact(n) => Some(*n),
            PlanTotal::Indeterminate => None,
        }
    }
}

/// One test method invocation: the method plus the fixtures around it.
#[derive(Debug, Clone)]
pub struct PlannedInvocation<'s> {
    pub method: &'s ResolvedMethod,
    pub chain: FixtureChain<'s>,
    pub expected: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PlannedClass<'s> {
    pub class: &'s ResolvedClass,
    pub class_chain: FixtureChain<'s>,
    pub invocations: Vec<PlannedInvocation<'s>>,
    pub expected: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunPlan<'s> {
    classes: Vec<PlannedClass<'s>>,
    skipped: Vec<&'s ResolvedClass>,
    total: PlanTotal,
}

impl<'s> RunPlan<'s> {
    pub fn build(suite: &'s Suite, selection: &Selection) -> Result<Self, RegistrationError> {
        let mut candidates: Vec<&ResolvedClass> = if selection.classes.is_empty() {
            suite.classes().collect()
        } else {
            let mut seen = HashSet::new();
            let mut picked = Vec::new();
            for name in &selection.classes {
                let class = suite
                    .class(name)
                    .ok_or_else(|| RegistrationError::UnknownClass {
                        class: name.clone(),
                    })?;
                if seen.insert(name.as_str()) {
                    picked.push(class);
                }
            }
            picked
        };

        match selection.order {
            ClassOrder::Alphabetical => candidates.sort_by(|a, b| a.name().cmp(b.name())),
            ClassOrder::Declaration => candidates.sort_by_key(|c| c.declared_at()),
        }

        let mut classes = Vec::new();
        let mut skipped = Vec::new();
        for class in candidates {
            if let Some(reason) = class.skip_reason() {
                tracing::debug!(class = class.name(), reason, "class skipped");
                skipped.push(class);
                continue;
            }
            let tests: Vec<&ResolvedMethod> = class
                .test_methods()
                .into_iter()
                .filter(|m| selection.matches_method(m.name()))
                .collect();
            if tests.is_empty() {
                tracing::debug!(class = class.name(), "no test methods selected");
                continue;
            }
            classes.push(plan_class(class, tests));
        }

        let total = classes
            .iter()
            .try_fold(0usize, |acc, c| c.expected.map(|n| acc + n))
            .map_or(PlanTotal::Indeterminate, PlanTotal::Exact);

        Ok(RunPlan {
            classes,
            skipped,
            total,
        })
    }

    pub fn classes(&self) -> &[PlannedClass<'s>] {
        &self.classes
    }

    pub fn total(&self) -> PlanTotal {
        self.total
    }

    /// (class, test method) pairs in final execution order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.classes.iter().flat_map(|c| {
            c.invocations
                .iter()
                .map(move |i| (c.class.name(), i.method.name()))
        })
    }

    /// Selected classes left out because they are marked skipped.
    pub fn skipped(&self) -> &[&'s ResolvedClass] {
        &self.skipped
    }
}

fn plan_class<'s>(class: &'s ResolvedClass, tests: Vec<&'s ResolvedMethod>) -> PlannedClass<'s> {
    let class_chain = FixtureChain::for_class(class);
    let chain = FixtureChain::for_invocation(class);
    let per_invocation_fixtures = chain.expected();

    let invocations: Vec<PlannedInvocation> = tests
        .into_iter()
        .map(|method| PlannedInvocation {
            method,
            expected: per_invocation_fixtures
                .and_then(|f| method.descriptor().expected.count().map(|n| n + f)),
            chain: chain.clone(),
        })
        .collect();

    let expected = class_chain.expected().and_then(|base| {
        invocations
            .iter()
            .try_fold(base, |acc, i| i.expected.map(|n| acc + n))
    });

    PlannedClass {
        class,
        class_chain,
        invocations,
        expected,
    }
}

impl Suite {
    /// The total a run with `selection` would announce.
    pub fn expected_total(&self, selection: &Selection) -> Result<PlanTotal, RegistrationError> {
        RunPlan::build(self, selection).map(|plan| plan.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::method::MethodDescriptor;
    use crate::registry::{ClassDecl, Registry};

    fn suite() -> Suite {
        let mut reg = Registry::new();
        reg.add_class(
            ClassDecl::new("Base"),
            [
                MethodDescriptor::setup("open", 1, |_| Ok(())),
                MethodDescriptor::test("inherited", 2, |_| Ok(())),
                MethodDescriptor::test("replaced", 10, |_| Ok(())),
            ],
        )
        .unwrap();
        reg.add_class(
            ClassDecl::new("Derived").extends("Base"),
            [
                MethodDescriptor::teardown("close", 1, |_| Ok(())),
                MethodDescriptor::setup_for_class("startup", 3, |_| Ok(())),
                MethodDescriptor::test("replaced", 1, |_| Ok(())),
                MethodDescriptor::test("quiet", 0, |_| Ok(())).no_test(),
            ],
        )
        .unwrap();
        reg.freeze().unwrap()
    }

    fn selection(config: RunConfig) -> Selection {
        config.selection().unwrap()
    }

    #[test]
    fn sums_tests_fixtures_and_class_fixtures() {
        let suite = suite();
        let sel = selection(RunConfig::default().only_classes(["Derived"]));
        let plan = RunPlan::build(&suite, &sel).unwrap();

        // per invocation: open(1) + close(1) around inherited(2), quiet(0), replaced(1)
        // = 4 + 2 + 3, plus startup(3) once
        assert_eq!(plan.total(), PlanTotal::Exact(12));
        let pairs: Vec<(&str, &str)> = plan.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("Derived", "inherited"),
                ("Derived", "quiet"),
                ("Derived", "replaced"),
            ]
        );
    }

    #[test]
    fn classes_run_alphabetically_by_default() {
        let suite = suite();
        let plan = RunPlan::build(&suite, &selection(RunConfig::default())).unwrap();
        let names: Vec<&str> = plan.classes().iter().map(|c| c.class.name()).collect();
        assert_eq!(names, vec!["Base", "Derived"]);
    }

    #[test]
    fn method_filter_narrows_plan() {
        let suite = suite();
        let sel = selection(RunConfig::default().filter_methods("inherited"));
        let plan = RunPlan::build(&suite, &sel).unwrap();
        // Base: open + inherited = 3; Derived: startup + open + inherited + close = 7
        assert_eq!(plan.total(), PlanTotal::Exact(10));
        assert_eq!(plan.pairs().count(), 2);
    }

    #[test]
    fn indeterminate_method_disables_upfront_plan() {
        let mut reg = Registry::new();
        reg.add_class(
            ClassDecl::new("Loose"),
            [
                MethodDescriptor::test("counted", 1, |_| Ok(())),
                MethodDescriptor::test("open_ended", 0, |_| Ok(())).indeterminate(),
            ],
        )
        .unwrap();
        let suite = reg.freeze().unwrap();
        assert_eq!(
            suite
                .expected_total(&selection(RunConfig::default()))
                .unwrap(),
            PlanTotal::Indeterminate
        );
    }

    #[test]
    fn skipped_classes_are_set_aside() {
        let mut reg = Registry::new();
        reg.add_class(
            ClassDecl::new("Later").skip("needs a database"),
            [MethodDescriptor::test("t", 1, |_| Ok(()))],
        )
        .unwrap();
        reg.add_class(
            ClassDecl::new("Now"),
            [MethodDescriptor::test("t", 1, |_| Ok(()))],
        )
        .unwrap();
        let suite = reg.freeze().unwrap();
        let plan = RunPlan::build(&suite, &selection(RunConfig::default())).unwrap();
        assert_eq!(plan.total(), PlanTotal::Exact(1));
        assert_eq!(plan.skipped().len(), 1);
        assert_eq!(plan.skipped()[0].name(), "Later");
    }

    #[test]
    fn unknown_selected_class_is_fatal() {
        let suite = suite();
        let sel = selection(RunConfig::default().only_classes(["Nope"]));
        assert!(matches!(
            RunPlan::build(&suite, &sel),
            Err(RegistrationError::UnknownClass { .. })
        ));
    }
}
