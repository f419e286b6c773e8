//! Method descriptors: what a test class declares about each of its methods.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::TestContext;

/// The role a method plays in a test class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Test,
    /// Runs before every test method of the class.
    Setup,
    /// Runs after every test method of the class.
    Teardown,
    /// Runs once before the first test method of the class.
    SetupForClass,
    /// Runs once after the last test method of the class.
    TeardownForClass,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Test => "test",
            MethodKind::Setup => "setup",
            MethodKind::Teardown => "teardown",
            MethodKind::SetupForClass => "setup_for_class",
            MethodKind::TeardownForClass => "teardown_for_class",
        }
    }

    pub fn is_fixture(&self) -> bool {
        !matches!(self, MethodKind::Test)
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many assertions a method promises to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    Exact(usize),
    /// Unknown upfront; disables the upfront plan for the whole run.
    Indeterminate,
    /// Deliberately empty: contributes 0 and must emit nothing.
    NoTest,
}

impl Expected {
    /// The count this method contributes to a plan, if knowable.
    pub fn count(&self) -> Option<usize> {
        match self {
            Expected::Exact(n) => Some(*n),
            Expected::NoTest => Some(0),
            Expected::Indeterminate => None,
        }
    }
}

impl From<usize> for Expected {
    fn from(n: usize) -> Self {
        Expected::Exact(n)
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Exact(n) => write!(f, "{}", n),
            Expected::Indeterminate => f.write_str("indeterminate"),
            Expected::NoTest => f.write_str("no-test"),
        }
    }
}

/// Sequencing key for methods of the same kind.
///
/// Numeric keys sort before lexical ones. Equal keys fall back to the
/// method name, so the order is always total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum OrderKey {
    Numeric(i64),
    Lexical(String),
}

impl From<i64> for OrderKey {
    fn from(n: i64) -> Self {
        OrderKey::Numeric(n)
    }
}

impl From<&str> for OrderKey {
    fn from(s: &str) -> Self {
        OrderKey::Lexical(s.to_string())
    }
}

impl From<String> for OrderKey {
    fn from(s: String) -> Self {
        OrderKey::Lexical(s)
    }
}

/// A method body. `Err` carries the failure diagnostic; panics are caught
/// by the runner and treated the same way.
pub type MethodBody = Arc<dyn Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync>;

/// One method registered on a test class.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub kind: MethodKind,
    pub expected: Expected,
    pub order_key: OrderKey,
    pub(crate) body: MethodBody,
}

impl MethodDescriptor {
    pub fn new<F>(
        name: impl Into<String>,
        kind: MethodKind,
        expected: Expected,
        body: F,
    ) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        MethodDescriptor {
            order_key: OrderKey::Lexical(name.clone()),
            name,
            kind,
            expected,
            body: Arc::new(body),
        }
    }

    pub fn test<F>(name: impl Into<String>, expected: usize, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(name, MethodKind::Test, Expected::Exact(expected), body)
    }

    pub fn setup<F>(name: impl Into<String>, expected: usize, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(name, MethodKind::Setup, Expected::Exact(expected), body)
    }

    pub fn teardown<F>(name: impl Into<String>, expected: usize, body: F) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(name, MethodKind::Teardown, Expected::Exact(expected), body)
    }

    pub fn setup_for_class<F>(
        name: impl Into<String>,
        expected: usize,
        body: F,
    ) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(name, MethodKind::SetupForClass, Expected::Exact(expected), body)
    }

    pub fn teardown_for_class<F>(
        name: impl Into<String>,
        expected: usize,
        body: F,
    ) -> Self
    where
        F: Fn(&mut TestContext<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self::new(name, MethodKind::TeardownForClass, Expected::Exact(expected), body)
    }

    pub fn expecting(mut self, expected: Expected) -> Self {
        self.expected = expected;
        self
    }

    pub fn indeterminate(self) -> Self {
        self.expecting(Expected::Indeterminate)
    }

    pub fn no_test(self) -> Self {
        self.expecting(Expected::NoTest)
    }

    pub fn with_order_key(mut self, key: impl Into<OrderKey>) -> Self {
        self.order_key = key.into();
        self
    }

    /// Order key first, name as the tie-break.
    pub fn sequence_cmp(&self, other: &MethodDescriptor) -> Ordering {
        self.order_key
            .cmp(&other.order_key)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("expected", &self.expected)
            .field("order_key", &self.order_key)
            .finish_non_exhaustive()
    }
}
