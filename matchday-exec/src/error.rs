//! Execution layer error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use matchday_domain::BookingInterval;
use matchday_engine::EngineError;
use matchday_store::StoreError;

/// Stable, caller-facing classification of booking failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request is malformed or not bookable; fatal
    ValidationError,
    /// Slot taken before payment; caller must re-select
    SlotConflict,
    /// Settlement not observed in time; retryable
    PaymentTimedOut,
    /// Gateway reported failure; terminal, no match
    PaymentFailed,
    /// Paid, but the slot was lost; payment flagged for reconciliation
    PostPaymentConflict,
    /// Referenced entity does not exist
    NotFound,
    /// Payment gateway unreachable or rejected the call
    GatewayError,
    /// Anything else
    InternalError,
}

impl ErrorCode {
    /// Wire form, e.g. `SLOT_CONFLICT`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::SlotConflict => "SLOT_CONFLICT",
            ErrorCode::PaymentTimedOut => "PAYMENT_TIMED_OUT",
            ErrorCode::PaymentFailed => "PAYMENT_FAILED",
            ErrorCode::PostPaymentConflict => "POST_PAYMENT_CONFLICT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::PaymentTimedOut | ErrorCode::GatewayError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Payment gateway communication error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Requested slot overlaps an existing booking
    #[error("Slot {} conflicts with an existing booking", .0.span)]
    SlotConflict(BookingInterval),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] matchday_domain::DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ExecError {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecError::Gateway(_) => ErrorCode::GatewayError,
            ExecError::SlotConflict(_) => ErrorCode::SlotConflict,
            ExecError::NotFound(_) | ExecError::Store(StoreError::NotFound { .. }) => {
                ErrorCode::NotFound
            },
            ExecError::Engine(_) | ExecError::Domain(_) => ErrorCode::ValidationError,
            ExecError::Store(StoreError::Domain(_)) | ExecError::InvalidState(_) => {
                ErrorCode::ValidationError
            },
            ExecError::Store(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Anything else will fail the same way on every retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ExecError::Gateway(_) => true,
            ExecError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
