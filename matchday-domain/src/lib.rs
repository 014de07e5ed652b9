//! Matchday Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the interval model, booking and payment entities, and the
//! format→duration policy shared by every other crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod format;
pub mod interval;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    BookingInterval, BookingRequest, Match, MatchId, MatchStatus, PaymentId, PaymentIntent,
    PaymentRecord, PaymentStatus, ReconciliationFlag, Venue, VenueId,
};
pub use format::{DurationPolicy, MatchFormat, StandardDurations};
pub use interval::HourSpan;
pub use value_objects::{Amount, DomainError, OperatingWindow};
