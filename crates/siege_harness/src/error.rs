//! Harness error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use siege_core::error::CoreError;
use thiserror::Error;

/// One problem found while checking a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field, e.g. `squads[1].soldiers`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    /// Create an issue.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Error type for harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Scenario file not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),

    /// The scenario was rejected before the run started.
    #[error("Scenario failed validation ({} issue(s))", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// The combat core refused an operation.
    #[error("Combat core error: {0}")]
    Core(#[from] CoreError),

    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The batch worker pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl HarnessError {
    /// Validation issues, if this is a validation failure.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            HarnessError::Validation(issues) => issues,
            _ => &[],
        }
    }
}
