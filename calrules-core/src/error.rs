//! Error types for the calrules ecosystem.

use thiserror::Error;

/// Errors that can occur in calrules operations.
///
/// Rule compilation and evaluation failures are not part of this enum: they
/// are recovered per rule by the pipeline (see [`crate::evaluator`]).
#[derive(Error, Debug)]
pub enum CalRulesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// A rule the store refuses to hold, such as one with an unusable id.
    #[error("{0}")]
    InvalidRule(String),

    #[error("Rule store error: {0}")]
    Store(String),

    #[error("Event source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for calrules operations.
pub type CalRulesResult<T> = Result<T, CalRulesError>;
