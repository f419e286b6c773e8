//! Run configuration.
//!
//! A run is shaped by a [`RunConfig`], usually left at its defaults. It can
//! be loaded from TOML and then overridden from the environment:
//!
//! ```toml
//! method_filter = "credit|debit"
//! classes = ["AccountTest"]
//! class_order = "declaration"
//! verbose = true
//! ```
//!
//! | Variable       | Overrides       |
//! |----------------|-----------------|
//! | `TEST_METHOD`  | `method_filter` |
//! | `TEST_VERBOSE` | `verbose`       |

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const TEST_METHOD_ENV: &str = "TEST_METHOD";
pub const TEST_VERBOSE_ENV: &str = "TEST_VERBOSE";

/// How selected classes are sequenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassOrder {
    /// By class name. Reproducible regardless of registration order.
    #[default]
    Alphabetical,
    /// In the order classes were declared on the registry.
    Declaration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Regular expression a test method name must match in full to run.
    pub method_filter: Option<String>,
    /// Classes to run. Empty means every runnable class.
    pub classes: Vec<String>,
    pub class_order: ClassOrder,
    /// Emit a `Class->method` diag line before each test method.
    pub verbose: bool,
}

impl RunConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: "inline config".to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            origin: format!("'{}'", path.display()),
            source,
        })
    }

    /// Apply `TEST_METHOD` and `TEST_VERBOSE` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(TEST_METHOD_ENV).ok(),
            std::env::var(TEST_VERBOSE_ENV).ok(),
        )
    }

    fn with_overrides(mut self, method: Option<String>, verbose: Option<String>) -> Self {
        if let Some(pattern) = method.filter(|p| !p.is_empty()) {
            self.method_filter = Some(pattern);
        }
        if let Some(flag) = verbose {
            self.verbose = !matches!(flag.trim(), "" | "0" | "false");
        }
        self
    }

    pub fn only_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter_methods(mut self, pattern: impl Into<String>) -> Self {
        self.method_filter = Some(pattern.into());
        self
    }

    /// Compile into the form the planner consumes.
    pub fn selection(&self) -> Result<Selection, ConfigError> {
        let method_filter = match &self.method_filter {
            Some(pattern) => Some(
                Regex::new(&format!(r"\A(?:{})\z", pattern)).map_err(|source| {
                    ConfigError::InvalidFilter {
                        pattern: pattern.clone(),
                        source,
                    }
                })?,
            ),
            None => None,
        };
        Ok(Selection {
            method_filter,
            classes: self.classes.clone(),
            order: self.class_order,
            verbose: self.verbose,
        })
    }
}

/// A compiled [`RunConfig`].
#[derive(Debug, Clone, Default)]
pub struct Selection {
    method_filter: Option<Regex>,
    pub(crate) classes: Vec<String>,
    pub(crate) order: ClassOrder,
    pub(crate) verbose: bool,
}

impl Selection {
    pub fn matches_method(&self, name: &str) -> bool {
        self.method_filter
            .as_ref()
            .map_or(true, |re| re.is_match(name))
    }
}
