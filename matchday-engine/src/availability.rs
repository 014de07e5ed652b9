//! Availability calculation.
//!
//! Free start hours for a venue and date are the starts `s` inside the
//! operating window such that no hour of `[s, s + d)` is occupied.

use matchday_domain::{BookingInterval, HourSpan, OperatingWindow};

/// Occupied hours of a single venue and date.
pub trait Occupancy {
    /// Mark every hour of `span` as taken.
    fn occupy(&mut self, span: &HourSpan);

    /// True iff no hour of `span` is taken.
    fn is_free(&self, span: &HourSpan) -> bool;
}

/// Hour-granular occupancy as a 24-bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HourSet(u32);

impl HourSet {
    /// Build from intervals, skipping those that no longer hold their slot.
    pub fn from_intervals<'a>(intervals: impl IntoIterator<Item = &'a BookingInterval>) -> Self {
        let mut set = Self::default();
        for interval in intervals.into_iter().filter(|i| i.is_occupying()) {
            set.occupy(&interval.span);
        }
        set
    }

    /// True iff `hour` is taken.
    pub fn contains(&self, hour: u8) -> bool {
        hour < 32 && self.0 & (1 << hour) != 0
    }

    fn mask(span: &HourSpan) -> u32 {
        span.hours().fold(0, |acc, h| acc | (1 << h))
    }
}

impl Occupancy for HourSet {
    fn occupy(&mut self, span: &HourSpan) {
        self.0 |= Self::mask(span);
    }

    fn is_free(&self, span: &HourSpan) -> bool {
        self.0 & Self::mask(span) == 0
    }
}

/// Free start hours for `duration_hours` against any occupancy structure.
///
/// Lazy and ascending. A zero duration or one longer than the window yields
/// nothing.
pub fn free_starts<O: Occupancy>(
    window: OperatingWindow,
    duration_hours: u8,
    occupancy: O,
) -> impl Iterator<Item = u8> {
    let fits = duration_hours > 0 && duration_hours <= window.as_span().duration_hours();
    let starts = if fits {
        window.opening()..=(window.closing() - duration_hours)
    } else {
        // empty range
        1..=0
    };

    starts.filter(move |&start| {
        HourSpan::starting_at(start, duration_hours)
            .map(|span| occupancy.is_free(&span))
            .unwrap_or(false)
    })
}

/// Free start hours given the intervals booked on a venue and date.
pub fn available_starts(
    window: OperatingWindow,
    duration_hours: u8,
    intervals: &[BookingInterval],
) -> impl Iterator<Item = u8> {
    free_starts(window, duration_hours, HourSet::from_intervals(intervals))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use matchday_domain::MatchStatus;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn interval(start: u8, end: u8, status: MatchStatus) -> BookingInterval {
        BookingInterval {
            venue_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            span: HourSpan::new(start, end).unwrap(),
            match_id: Uuid::now_v7(),
            status,
        }
    }

    #[test]
    fn test_empty_day_offers_every_start() {
        let starts: Vec<u8> = available_starts(OperatingWindow::default(), 2, &[]).collect();
        assert_eq!(starts, (6..=20).collect::<Vec<u8>>());
    }

    #[test]
    fn test_booked_hours_are_skipped() {
        let booked = vec![interval(10, 12, MatchStatus::Scheduled)];
        let starts: Vec<u8> = available_starts(OperatingWindow::default(), 2, &booked).collect();

        assert!(!starts.contains(&9));
        assert!(!starts.contains(&10));
        assert!(!starts.contains(&11));
        assert!(starts.contains(&8));
        assert!(starts.contains(&12));
    }

    #[test]
    fn test_cancelled_and_completed_do_not_block() {
        let booked = vec![
            interval(10, 12, MatchStatus::Cancelled),
            interval(14, 15, MatchStatus::Completed),
            interval(18, 19, MatchStatus::Ongoing),
        ];
        let starts: Vec<u8> = available_starts(OperatingWindow::default(), 1, &booked).collect();

        assert!(starts.contains(&10));
        assert!(starts.contains(&14));
        assert!(!starts.contains(&18));
    }

    #[test]
    fn test_invalid_durations_yield_nothing() {
        let window = OperatingWindow::default();
        assert_eq!(available_starts(window, 0, &[]).count(), 0);
        assert_eq!(available_starts(window, 17, &[]).count(), 0);
        assert_eq!(available_starts(window, 16, &[]).collect::<Vec<_>>(), vec![6]);
    }

    #[test]
    fn test_last_slot_ends_at_closing() {
        let starts: Vec<u8> = available_starts(OperatingWindow::default(), 3, &[]).collect();
        assert_eq!(starts.last(), Some(&19));
    }

    #[test]
    fn test_hour_set() {
        let set = HourSet::from_intervals(&[interval(6, 8, MatchStatus::Scheduled)]);
        assert!(set.contains(6));
        assert!(set.contains(7));
        assert!(!set.contains(8));
        assert!(set.is_free(&HourSpan::new(8, 10).unwrap()));
        assert!(!set.is_free(&HourSpan::new(5, 7).unwrap()));
    }

    fn any_booking() -> impl Strategy<Value = (u8, u8, bool)> {
        (6u8..22).prop_flat_map(|start| (Just(start), 1u8..=3, any::<bool>()))
    }

    proptest! {
        #[test]
        fn prop_free_starts_avoid_occupied_intervals(
            bookings in proptest::collection::vec(any_booking(), 0..6),
            duration in 1u8..=3,
        ) {
            let intervals: Vec<BookingInterval> = bookings
                .iter()
                .filter(|(start, len, _)| start + len <= 22)
                .map(|&(start, len, cancelled)| {
                    let status = if cancelled { MatchStatus::Cancelled } else { MatchStatus::Scheduled };
                    interval(start, start + len, status)
                })
                .collect();

            let window = OperatingWindow::default();
            for start in available_starts(window, duration, &intervals) {
                let span = HourSpan::starting_at(start, duration).unwrap();
                prop_assert!(window.admits(&span));
                for booked in intervals.iter().filter(|i| i.is_occupying()) {
                    prop_assert!(!span.overlaps(&booked.span));
                }
            }
        }
    }
}
