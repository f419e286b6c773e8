use std::path::PathBuf;

use crate::method::MethodKind;

/// Problems detected while classes and methods are being declared.
///
/// Always fatal: a run never starts from a registry that produced one.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The same (class, method) pair was registered twice with different kinds.
    #[error(
        "method {class}::{method} is already registered as {existing}, cannot re-register it as {requested}"
    )]
    DuplicateRegistration {
        class: String,
        method: String,
        existing: MethodKind,
        requested: MethodKind,
    },

    #[error("class {class} is already declared")]
    DuplicateClass { class: String },

    /// A method was registered on, or a run selected, a class nobody declared.
    #[error("class {class} is not declared")]
    UnknownClass { class: String },

    #[error("class {class} extends undeclared class {parent}")]
    UnknownParent { class: String, parent: String },

    #[error("inheritance cycle through class {class}")]
    InheritanceCycle { class: String },
}

/// Misuse of the assertion API. Aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("assertion '{description}' emitted outside any active test method")]
    AssertionOutsideMethod { description: String },

    #[error("assertion '{description}' emitted after the run summary")]
    AssertionAfterSummary { description: String },

    #[error("{class}->{method} declares no tests but emitted assertion '{description}'")]
    AssertionInNoTestMethod {
        class: String,
        method: String,
        description: String,
    },
}

/// Errors loading or compiling a [`RunConfig`](crate::RunConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid method filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A fatal, run-level error. Ordinary test failures never produce one.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("harness output failed: {0}")]
    Harness(#[from] std::io::Error),
}
