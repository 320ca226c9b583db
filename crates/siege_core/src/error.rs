//! Error types for the combat core.
//!
//! Only genuinely exceptional conditions live here. A target that died
//! between selection and resolution, an empty range band or a tower with no
//! free spawn cell are ordinary outcomes and are modelled with `Option`.

use thiserror::Error;

use crate::entity::EntityId;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error type for the combat core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration rejected before a run starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Operation not legal in the current battle state.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),

    /// Stat table parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParse {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },
}

impl CoreError {
    /// Shorthand for an [`CoreError::InvalidConfiguration`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}
