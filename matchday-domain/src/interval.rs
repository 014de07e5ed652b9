//! Interval model for venue time slots.
//!
//! A slot is a half-open range of whole hours `[start, end)` on a single
//! venue and date. [`HourSpan::overlaps`] is the one overlap predicate in the
//! system: availability and conflict validation both go through it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::DomainError;

/// Number of hours in a day; spans never extend past it.
pub const HOURS_PER_DAY: u8 = 24;

/// Half-open range of whole hours `[start, end)`.
///
/// # Invariants
/// - `start < end`
/// - `end <= 24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawSpan", into = "RawSpan")]
pub struct HourSpan {
    start: u8,
    end: u8,
}

#[derive(Serialize, Deserialize)]
struct RawSpan {
    start: u8,
    end: u8,
}

impl TryFrom<RawSpan> for HourSpan {
    type Error = DomainError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        HourSpan::new(raw.start, raw.end)
    }
}

impl From<HourSpan> for RawSpan {
    fn from(span: HourSpan) -> Self {
        RawSpan { start: span.start, end: span.end }
    }
}

impl HourSpan {
    /// Create a span from explicit bounds.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSpan` if the span is empty, inverted, or
    /// runs past midnight.
    pub fn new(start: u8, end: u8) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::InvalidSpan(format!(
                "start {} must be before end {}",
                start, end
            )));
        }
        if end > HOURS_PER_DAY {
            return Err(DomainError::InvalidSpan(format!("end {} is past midnight", end)));
        }
        Ok(Self { start, end })
    }

    /// Create a span from a start hour and a duration in hours.
    ///
    /// ```
    /// # use matchday_domain::HourSpan;
    /// let span = HourSpan::starting_at(10, 2).unwrap();
    /// assert_eq!((span.start(), span.end()), (10, 12));
    /// ```
    pub fn starting_at(start: u8, duration_hours: u8) -> Result<Self, DomainError> {
        let end = start.checked_add(duration_hours).ok_or_else(|| {
            DomainError::InvalidSpan(format!("{} + {} overflows", start, duration_hours))
        })?;
        Self::new(start, end)
    }

    /// First hour covered by the span.
    pub fn start(&self) -> u8 {
        self.start
    }

    /// First hour after the span.
    pub fn end(&self) -> u8 {
        self.end
    }

    /// Length of the span in hours.
    pub fn duration_hours(&self) -> u8 {
        self.end - self.start
    }

    /// True iff the two spans share at least one hour.
    ///
    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &HourSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True iff `other` lies entirely inside `self`.
    pub fn contains(&self, other: &HourSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Iterate the hours covered by the span.
    pub fn hours(&self) -> impl Iterator<Item = u8> {
        self.start..self.end
    }
}

impl fmt::Display for HourSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn span(start: u8, end: u8) -> HourSpan {
        HourSpan::new(start, end).unwrap()
    }

    #[test]
    fn test_span_validation() {
        assert!(HourSpan::new(10, 12).is_ok());
        assert!(HourSpan::new(0, 24).is_ok());
        assert!(HourSpan::new(12, 12).is_err());
        assert!(HourSpan::new(13, 12).is_err());
        assert!(HourSpan::new(22, 25).is_err());
        assert!(HourSpan::starting_at(250, 10).is_err());
    }

    #[test]
    fn test_overlap_cases() {
        let booked = span(10, 12);

        assert!(booked.overlaps(&span(9, 11)));
        assert!(booked.overlaps(&span(11, 13)));
        assert!(booked.overlaps(&span(10, 12)));
        assert!(booked.overlaps(&span(8, 14)));
        assert!(booked.overlaps(&span(10, 11)));
    }

    #[test]
    fn test_touching_spans_do_not_overlap() {
        let booked = span(10, 12);

        assert!(!booked.overlaps(&span(12, 14)));
        assert!(!booked.overlaps(&span(8, 10)));
        assert!(!span(12, 14).overlaps(&booked));
    }

    #[test]
    fn test_hours_and_display() {
        let s = span(20, 22);
        assert_eq!(s.hours().collect::<Vec<_>>(), vec![20, 21]);
        assert_eq!(s.duration_hours(), 2);
        assert_eq!(s.to_string(), "[20,22)");
    }

    #[test]
    fn test_serde_rejects_invalid_span() {
        let ok: HourSpan = serde_json::from_str(r#"{"start":9,"end":11}"#).unwrap();
        assert_eq!(ok, span(9, 11));

        let bad = serde_json::from_str::<HourSpan>(r#"{"start":11,"end":9}"#);
        assert!(bad.is_err());
    }

    fn any_span() -> impl Strategy<Value = HourSpan> {
        (0u8..24)
            .prop_flat_map(|start| (Just(start), (start + 1)..=24))
            .prop_map(|(start, end)| HourSpan::new(start, end).unwrap())
    }

    proptest! {
        #[test]
        fn prop_overlap_is_symmetric(a in any_span(), b in any_span()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn prop_touching_never_overlaps(start in 0u8..22, left in 1u8..3, right in 1u8..3) {
            prop_assume!(start >= left);
            let a = HourSpan::new(start - left, start).unwrap();
            prop_assume!(start + right <= 24);
            let b = HourSpan::new(start, start + right).unwrap();
            prop_assert!(!a.overlaps(&b));
        }

        #[test]
        fn prop_overlap_matches_shared_hours(a in any_span(), b in any_span()) {
            let shared = a.hours().any(|h| b.hours().any(|k| k == h));
            prop_assert_eq!(a.overlaps(&b), shared);
        }
    }
}
