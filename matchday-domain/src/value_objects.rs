//! Value Objects for the Matchday Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::interval::{HourSpan, HOURS_PER_DAY};

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Hour span is empty, inverted, or past midnight
    #[error("Invalid span: {0}")]
    InvalidSpan(String),

    /// Operating window is malformed
    #[error("Invalid operating window: {0}")]
    InvalidWindow(String),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Match format is not recognised
    #[error("Unknown match format: {0}")]
    UnknownFormat(String),

    /// Duration outside the bookable range
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Status string could not be parsed
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Amount
// =============================================================================

/// Amount represents a positive monetary value in the payment currency
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Create a new Amount with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAmount` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidAmount("Amount must be positive".to_string()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// OperatingWindow
// =============================================================================

/// Hours during which a venue accepts bookings.
///
/// Bookings must start at or after `opening` and end at or before `closing`.
///
/// # Invariants
/// - `opening < closing <= 24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    span: HourSpan,
}

impl OperatingWindow {
    /// Default opening hour (6 AM)
    pub const DEFAULT_OPENING: u8 = 6;
    /// Default closing hour (10 PM)
    pub const DEFAULT_CLOSING: u8 = 22;

    /// Create a new window with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidWindow` if `opening >= closing` or
    /// `closing > 24`
    pub fn new(opening: u8, closing: u8) -> Result<Self, DomainError> {
        if opening >= closing {
            return Err(DomainError::InvalidWindow(format!(
                "opening {} must be before closing {}",
                opening, closing
            )));
        }
        if closing > HOURS_PER_DAY {
            return Err(DomainError::InvalidWindow(format!("closing {} is past midnight", closing)));
        }
        let span = HourSpan::new(opening, closing)
            .map_err(|e| DomainError::InvalidWindow(e.to_string()))?;
        Ok(Self { span })
    }

    /// Opening hour
    pub fn opening(&self) -> u8 {
        self.span.start()
    }

    /// Closing hour
    pub fn closing(&self) -> u8 {
        self.span.end()
    }

    /// The window as an hour span
    pub fn as_span(&self) -> HourSpan {
        self.span
    }

    /// True iff the whole span fits inside the window
    pub fn admits(&self, span: &HourSpan) -> bool {
        self.span.contains(span)
    }
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_OPENING, Self::DEFAULT_CLOSING)
            .unwrap_or_else(|e| unreachable!("default window is valid: {}", e))
    }
}

impl fmt::Display for OperatingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.opening(), self.closing())
    }
}

// =============================================================================
// Tests
// =============================================================================
