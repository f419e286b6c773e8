//! Fixture Chain Builder.
//!
//! Setup methods run from the most ancestral declaring class down to the
//! most derived one, so a derived setup can rely on whatever its bases
//! established. Teardown methods run the other way round: the most derived
//! class releases first and the base releases last.
//!
//! Fixture methods declared directly on the same class run in order-key
//! order in both directions.

use std::cmp::Ordering;

use crate::method::MethodKind;
use crate::registry::{ResolvedClass, ResolvedMethod};

#[derive(Debug, Clone, Default)]
pub struct FixtureChain<'s> {
    pub setup: Vec<&'s ResolvedMethod>,
    pub teardown: Vec<&'s ResolvedMethod>,
}

impl<'s> FixtureChain<'s> {
    /// The chain wrapped around each test method invocation of `class`.
    ///
    /// Fixtures apply to every test method of a class alike, so the chain
    /// depends on the class alone.
    pub fn for_invocation(class: &'s ResolvedClass) -> Self {
        Self::build(class, MethodKind::Setup, MethodKind::Teardown)
    }

    /// The chain run once around all test methods of `class`.
    pub fn for_class(class: &'s ResolvedClass) -> Self {
        Self::build(
            class,
            MethodKind::SetupForClass,
            MethodKind::TeardownForClass,
        )
    }

    fn build(class: &'s ResolvedClass, setup: MethodKind, teardown: MethodKind) -> Self {
        let mut setup: Vec<&ResolvedMethod> = class.methods_of_kind(setup).collect();
        setup.sort_by(|a, b| ancestral_first(a, b));

        let mut teardown: Vec<&ResolvedMethod> = class.methods_of_kind(teardown).collect();
        teardown.sort_by(|a, b| {
            b.depth()
                .cmp(&a.depth())
                .then_with(|| a.descriptor().sequence_cmp(b.descriptor()))
        });

        FixtureChain { setup, teardown }
    }

    /// Sum of the exact counts of every fixture method, or `None` if any of
    /// them is indeterminate.
    pub fn expected(&self) -> Option<usize> {
        self.setup
            .iter()
            .chain(self.teardown.iter())
            .map(|m| m.descriptor().expected)
            .try_fold(0usize, |acc, e| e.count().map(|n| acc + n))
    }

    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.teardown.is_empty()
    }
}

fn ancestral_first(a: &ResolvedMethod, b: &ResolvedMethod) -> Ordering {
    a.depth()
        .cmp(&b.depth())
        .then_with(|| a.descriptor().sequence_cmp(b.descriptor()))
}
