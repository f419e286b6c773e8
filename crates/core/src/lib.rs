//! classtap-core: class-based test execution engine.
//!
//! Test classes are registered with their test and fixture methods, frozen
//! into a [`Suite`], planned and then run against a [`Harness`]. Every
//! assertion is numbered across the whole run and attributed to the test
//! method it ran under.
//!
//! # Public API
//!
//! - [`Registry`] / [`ClassDecl`] / [`MethodDescriptor`] -- declare classes
//! - [`Suite`] -- frozen, inheritance-resolved classes; [`Suite::run`]
//! - [`RunPlan`] -- selection, order and expected totals
//! - [`RunConfig`] -- method filter, class selection, verbosity
//! - [`TestContext`] -- what a method body uses to assert
//! - [`RunReport`] / [`ExitStatus`] -- the outcome
//!
//! Harness types from `classtap-harness` are re-exported at the root.

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod fixture;
pub mod method;
pub mod plan;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod runner;

// ── Convenience re-exports: key types ────────────────────────────────

pub use chain::FixtureChain;
pub use config::{ClassOrder, RunConfig, Selection};
pub use context::TestContext;
pub use error::{ConfigError, ProtocolViolation, RegistrationError, RunError};
pub use fixture::Fixture;
pub use method::{Expected, MethodBody, MethodDescriptor, MethodKind, OrderKey};
pub use plan::{PlanTotal, RunPlan};
pub use registry::{ClassDecl, Registry, ResolvedClass, ResolvedMethod, Suite};
pub use report::{ExecutionResult, ExitStatus, InvocationState, InvocationSummary, RunReport};
pub use runner::{Outcome, Runner};

// ── Convenience re-exports: harness ──────────────────────────────────

pub use classtap_harness::{AssertionRecord, Harness, RecordingHarness, TapWriter};
