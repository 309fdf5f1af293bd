//! Error taxonomy for the analysis engine.

use thiserror::Error;

use crate::types::ValidationError;

/// Errors raised by the analysis engine.
///
/// Missing evidence is never an error: it is an empty result. Unrecognized
/// event types are counted, not raised.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// An entry point received an argument it cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No catch-all capture detection strategy was registered.
    #[error("no default capture detection strategy registered")]
    MissingDefaultStrategy,

    /// More than one catch-all capture detection strategy was registered.
    #[error("multiple default capture detection strategies registered: {}", .0.join(", "))]
    DuplicateDefaultStrategy(Vec<&'static str>),

    /// A core type failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Shorthand result type for the engine.
pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
