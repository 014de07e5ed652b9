//! Matchday Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes intervals and requests → returns free slots and verdicts.

#![warn(clippy::all)]

pub mod availability;
pub mod conflict;
pub mod error;
pub mod guard;

pub use availability::{available_starts, free_starts, HourSet, Occupancy};
pub use conflict::{find_conflict, BookingRules, Verdict};
pub use error::{EngineError, EngineResult};
pub use guard::{Generation, GenerationGuard, GuardedView, View};
