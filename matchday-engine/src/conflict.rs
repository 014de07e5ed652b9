//! Conflict validation for booking requests.
//!
//! The same check runs twice: advisory before payment, and authoritative
//! inside the commit lock after settlement.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use matchday_domain::{
    BookingInterval, BookingRequest, DurationPolicy, HourSpan, OperatingWindow, StandardDurations,
    Venue,
};

use crate::error::{EngineError, EngineResult};

/// Outcome of a conflict check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "conflict", rename_all = "snake_case")]
pub enum Verdict {
    /// No occupying interval overlaps the request
    Accepted,
    /// Rejected, citing the interval it collides with
    Rejected(BookingInterval),
}

impl Verdict {
    /// True for `Accepted`
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    /// The conflicting interval, if rejected
    pub fn conflicting(&self) -> Option<&BookingInterval> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(interval) => Some(interval),
        }
    }
}

/// Earliest occupying interval on the same venue and date that overlaps `span`.
pub fn find_conflict<'a>(
    request: &BookingRequest,
    span: &HourSpan,
    intervals: &'a [BookingInterval],
) -> Option<&'a BookingInterval> {
    intervals
        .iter()
        .filter(|i| i.venue_id == request.venue_id && i.date == request.date)
        .filter(|i| i.is_occupying() && i.span.overlaps(span))
        .min_by_key(|i| i.span)
}

/// Operating window plus format→duration policy.
#[derive(Clone)]
pub struct BookingRules {
    window: OperatingWindow,
    policy: Arc<dyn DurationPolicy>,
}

impl BookingRules {
    /// Rules with an explicit window and policy
    pub fn new(window: OperatingWindow, policy: Arc<dyn DurationPolicy>) -> Self {
        Self { window, policy }
    }

    /// Operating window in force
    pub fn window(&self) -> OperatingWindow {
        self.window
    }

    /// Duration policy in force
    pub fn policy(&self) -> &dyn DurationPolicy {
        self.policy.as_ref()
    }

    /// Validate a request and return the span it would occupy.
    ///
    /// # Errors
    /// `EngineError::Validation` when the venue is unknown or inactive, the
    /// date is in the past, or the span does not fit the operating window.
    /// Policy durations outside `1..=3` surface as `EngineError::Domain`.
    pub fn validate(
        &self,
        request: &BookingRequest,
        venue: Option<&Venue>,
        today: NaiveDate,
    ) -> EngineResult<HourSpan> {
        let venue = venue.ok_or_else(|| {
            EngineError::Validation(format!("venue {} does not exist", request.venue_id))
        })?;
        if !venue.active {
            return Err(EngineError::Validation(format!("venue {} is not active", venue.id)));
        }
        if request.date < today {
            return Err(EngineError::Validation(format!(
                "date {} is in the past",
                request.date
            )));
        }

        let span = request.span(self.policy.as_ref())?;
        if !self.window.admits(&span) {
            return Err(EngineError::Validation(format!(
                "{} {} is outside operating hours {}",
                request.format, span, self.window
            )));
        }
        Ok(span)
    }

    /// Validate, then check the request against the current intervals.
    ///
    /// Pure: identical inputs give identical verdicts.
    pub fn check(
        &self,
        request: &BookingRequest,
        venue: Option<&Venue>,
        today: NaiveDate,
        intervals: &[BookingInterval],
    ) -> EngineResult<Verdict> {
        let span = self.validate(request, venue, today)?;
        let verdict = match find_conflict(request, &span, intervals) {
            Some(conflict) => Verdict::Rejected(conflict.clone()),
            None => Verdict::Accepted,
        };
        debug!(
            venue_id = %request.venue_id,
            date = %request.date,
            %span,
            accepted = verdict.is_accepted(),
            "Conflict check"
        );
        Ok(verdict)
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self::new(OperatingWindow::default(), Arc::new(StandardDurations))
    }
}

impl std::fmt::Debug for BookingRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingRules").field("window", &self.window).finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
