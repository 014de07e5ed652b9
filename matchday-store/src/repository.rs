//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::NaiveDate;
use matchday_domain::{
    BookingInterval, Match, MatchId, PaymentRecord, PaymentStatus, ReconciliationFlag, Venue,
    VenueId,
};

/// Repository for Venue entities
#[async_trait]
pub trait VenueRepository: Send + Sync {
    /// Save a venue (insert or update)
    async fn save(&self, venue: &Venue) -> Result<(), StoreError>;

    /// Find a venue by ID
    async fn find_by_id(&self, id: VenueId) -> Result<Option<Venue>, StoreError>;
}

/// Read side of booked intervals
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Intervals that currently hold a slot (scheduled or ongoing) on a venue and date
    async fn find_occupying(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<BookingInterval>, StoreError>;
}

/// Repository for PaymentRecord entities
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Insert a new payment record
    ///
    /// Fails with `Duplicate` if the external order id is already known.
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError>;

    /// Find a payment by the gateway's order id
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentRecord>, StoreError>;

    /// Apply a gateway callback to the payment.
    ///
    /// Duplicate deliveries are no-ops; conflicting terminal statuses are
    /// rejected with a domain error. Returns the record after the update.
    async fn apply_gateway_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        external_payment_id: Option<&str>,
    ) -> Result<PaymentRecord, StoreError>;

    /// Settled payments with no linked match and no reconciliation flag, oldest first
    async fn find_settled_unlinked(&self, limit: usize) -> Result<Vec<PaymentRecord>, StoreError>;

    /// Flag a settled, unlinked payment for manual reconciliation.
    ///
    /// An already-flagged payment keeps its first flag; a linked payment is
    /// rejected with `InvalidState`. Returns the record after the update.
    async fn flag_for_reconciliation(
        &self,
        order_id: &str,
        flag: ReconciliationFlag,
    ) -> Result<PaymentRecord, StoreError>;

    /// Payments flagged for manual reconciliation
    async fn find_flagged(&self) -> Result<Vec<PaymentRecord>, StoreError>;
}

/// Repository for Match entities
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Find a match by ID
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, StoreError>;

    /// Find all matches on a venue and date, any status
    async fn find_by_venue_date(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Match>, StoreError>;

    /// Cancel a scheduled match, freeing its slot
    async fn cancel(&self, id: MatchId, reason: Option<String>) -> Result<Match, StoreError>;
}

/// Authoritative conflict check run inside the commit lock.
///
/// Receives the occupying intervals for the draft's venue and date and
/// returns the interval the draft collides with, if any.
pub type ConflictCheck<'a> = dyn Fn(&[BookingInterval]) -> Option<BookingInterval> + Send + Sync + 'a;

/// Result of committing a match for a settled payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Match inserted and payment linked
    Committed(Match),
    /// Payment was already linked; the existing match
    AlreadyCommitted(Match),
    /// Slot lost to another commit; the payment is flagged
    Conflict(ReconciliationFlag),
}

/// Combined store interface
#[async_trait]
pub trait Store: Send + Sync {
    /// Get venue repository
    fn venues(&self) -> &dyn VenueRepository;

    /// Get booking repository
    fn bookings(&self) -> &dyn BookingRepository;

    /// Get payment repository
    fn payments(&self) -> &dyn PaymentRepository;

    /// Get match repository
    fn matches(&self) -> &dyn MatchRepository;

    /// Commit `draft` for the settled payment `order_id`.
    ///
    /// Runs as one unit under a lock scoped to the draft's venue and date:
    /// re-read occupying intervals, run `check`, then either insert the match
    /// and link the payment, or flag the payment for reconciliation.
    ///
    /// Idempotent per payment: a linked payment returns its match, a flagged
    /// payment returns its flag.
    async fn commit_match(
        &self,
        order_id: &str,
        draft: Match,
        check: &ConflictCheck<'_>,
    ) -> Result<CommitOutcome, StoreError>;
}

/// Flag recorded on a settled payment whose slot was taken by `conflict`.
pub(crate) fn conflict_flag(conflict: &BookingInterval) -> ReconciliationFlag {
    ReconciliationFlag {
        reason: format!(
            "slot {} on {} taken by match {} after payment settled",
            conflict.span, conflict.date, conflict.match_id
        ),
        conflicting_span: Some(conflict.span),
        conflicting_match_id: Some(conflict.match_id),
        flagged_at: chrono::Utc::now(),
    }
}
