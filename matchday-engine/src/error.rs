//! Engine error types

use matchday_domain::DomainError;
use thiserror::Error;

/// Errors raised while validating a booking request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Request is malformed or not bookable (fatal, caller must fix input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Domain value could not be built
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
