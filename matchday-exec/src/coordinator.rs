//! Booking Coordinator: availability, validation, payment, and commit.
//!
//! The coordinator bridges the pure engine (slots and verdicts) and the
//! impure world (store and payment gateway). Payment comes first; the slot
//! is re-validated under the store's commit lock once the payment settles.
//!
//! # Flow
//!
//! ```text
//! validate → create intent → insert PaymentRecord(created)
//!          → poll → Settled → commit_match (locked re-check) → Committed | Conflict
//!                 → Failed  → PaymentFailed
//!                 → TimedOut | Cancelled → PaymentPendingRetry (reconciler finishes later)
//! ```

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use matchday_domain::{
    Amount, BookingRequest, HourSpan, Match, MatchFormat, MatchId, PaymentIntent, PaymentRecord,
    PaymentStatus, ReconciliationFlag, VenueId,
};
use matchday_engine::{available_starts, find_conflict, BookingRules, Verdict};
use matchday_store::{CommitOutcome, Store};

use crate::error::{ErrorCode, ExecError, ExecResult};
use crate::poller::{PaymentPoller, PollOutcome, PollPolicy};
use crate::ports::PaymentGatewayPort;

// =============================================================================
// Booking Outcome
// =============================================================================

/// Final result of a pay-then-commit flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    /// Match created and linked to the payment
    Committed {
        /// The committed match
        #[serde(rename = "match")]
        committed: Match,
    },
    /// Paid, but the slot was taken meanwhile; payment flagged for refund
    /// or reassignment
    BookingConflict {
        /// Gateway order id of the flagged payment
        order_id: String,
        /// Span that won the slot
        conflicting_span: Option<HourSpan>,
        /// Match that won the slot
        conflicting_match_id: Option<MatchId>,
    },
    /// Gateway reported failure; no match
    PaymentFailed {
        /// Gateway order id
        order_id: String,
    },
    /// Settlement not seen yet; retry later (the payment is not failed)
    PaymentPendingRetry {
        /// Gateway order id
        order_id: String,
    },
}

impl BookingOutcome {
    /// Error code for non-committed outcomes
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            BookingOutcome::Committed { .. } => None,
            BookingOutcome::BookingConflict { .. } => Some(ErrorCode::PostPaymentConflict),
            BookingOutcome::PaymentFailed { .. } => Some(ErrorCode::PaymentFailed),
            BookingOutcome::PaymentPendingRetry { .. } => Some(ErrorCode::PaymentTimedOut),
        }
    }

    /// Message suitable for the caller
    pub fn message(&self) -> &'static str {
        match self {
            BookingOutcome::Committed { .. } => "Booking confirmed",
            BookingOutcome::BookingConflict { .. } => {
                "Payment received but the slot was taken; a refund or new slot will be arranged"
            },
            BookingOutcome::PaymentFailed { .. } => "Payment failed; no booking was made",
            BookingOutcome::PaymentPendingRetry { .. } => {
                "Payment is still processing; please try again shortly"
            },
        }
    }

    /// The committed match, if any
    pub fn committed(&self) -> Option<&Match> {
        match self {
            BookingOutcome::Committed { committed } => Some(committed),
            _ => None,
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Drives booking requests from availability through commit.
pub struct BookingCoordinator<S: Store, G: PaymentGatewayPort> {
    /// Store for venues, bookings, payments
    store: Arc<S>,
    /// Payment gateway for creating intents
    gateway: Arc<G>,
    /// Window and duration policy
    rules: BookingRules,
    /// Settlement poller
    poller: PaymentPoller<S>,
}

impl<S: Store, G: PaymentGatewayPort> BookingCoordinator<S, G> {
    /// Create a new coordinator.
    pub fn new(store: Arc<S>, gateway: Arc<G>, rules: BookingRules, poll: PollPolicy) -> Self {
        let poller = PaymentPoller::new(store.clone(), poll);
        Self { store, gateway, rules, poller }
    }

    /// Booking rules in force
    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Payment gateway
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Free start hours for `duration_hours` on a venue and date.
    pub async fn get_availability(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
        duration_hours: u8,
    ) -> ExecResult<Vec<u8>> {
        self.store
            .venues()
            .find_by_id(venue_id)
            .await?
            .ok_or_else(|| ExecError::NotFound(format!("venue {}", venue_id)))?;

        let intervals = self.store.bookings().find_occupying(venue_id, date).await?;
        let starts: Vec<u8> =
            available_starts(self.rules.window(), duration_hours, &intervals).collect();

        debug!(%venue_id, %date, duration_hours, free = starts.len(), "Availability computed");
        Ok(starts)
    }

    /// Free start hours for a match format on a venue and date.
    pub async fn get_availability_for_format(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
        format: MatchFormat,
    ) -> ExecResult<Vec<u8>> {
        let duration = self.rules.policy().checked_duration(format)?;
        self.get_availability(venue_id, date, duration).await
    }

    /// Advisory conflict check against current bookings.
    ///
    /// Idempotent: with unchanged store state the verdict is the same.
    pub async fn validate_booking(&self, request: &BookingRequest) -> ExecResult<Verdict> {
        let venue = self.store.venues().find_by_id(request.venue_id).await?;
        let intervals = self.store.bookings().find_occupying(request.venue_id, request.date).await?;
        Ok(self.rules.check(request, venue.as_ref(), today(), &intervals)?)
    }

    /// Validate the request, create a gateway intent, and record the payment
    /// as `created`.
    ///
    /// # Errors
    /// `SlotConflict` if the advisory check already rejects the request.
    pub async fn initiate_payment(
        &self,
        request: &BookingRequest,
        amount: Amount,
        currency: &str,
        receipt_id: &str,
    ) -> ExecResult<PaymentIntent> {
        if let Verdict::Rejected(conflict) = self.validate_booking(request).await? {
            info!(
                venue_id = %request.venue_id,
                date = %request.date,
                conflicting = %conflict.span,
                "Slot already taken, payment not initiated"
            );
            return Err(ExecError::SlotConflict(conflict));
        }

        let intent = self.gateway.create_intent(amount, currency, receipt_id).await?;
        let record = PaymentRecord::new(&intent, request.clone());
        self.store.payments().insert(&record).await?;

        info!(
            order_id = %intent.intent_id,
            venue_id = %request.venue_id,
            date = %request.date,
            start_hour = request.start_hour,
            format = %request.format,
            %amount,
            "Payment initiated"
        );
        Ok(intent)
    }

    /// Wait for settlement of `order_id`, then commit.
    ///
    /// This is the `InitiateAndCommit(request, intent)` step keyed by
    /// `intent.intent_id`: the request was stored on the PaymentRecord by
    /// [`initiate_payment`](Self::initiate_payment) and is read back from
    /// there, so a restarted caller needs only the order id.
    ///
    /// Cancelling `cancel` stops the wait only; the payment stays recorded
    /// and is committed later by `resume` or the reconciler.
    pub async fn initiate_and_commit(
        &self,
        order_id: &str,
        cancel: &CancellationToken,
    ) -> ExecResult<BookingOutcome> {
        match self.poller.poll(order_id, cancel).await {
            PollOutcome::Settled(record) => self.commit_settled(&record).await,
            PollOutcome::Failed(record) => Ok(failed(&record)),
            PollOutcome::TimedOut { attempts } => {
                info!(order_id, attempts, "Settlement pending, caller may retry");
                Ok(BookingOutcome::PaymentPendingRetry { order_id: order_id.to_string() })
            },
            PollOutcome::Cancelled => {
                Ok(BookingOutcome::PaymentPendingRetry { order_id: order_id.to_string() })
            },
        }
    }

    /// Single read of `order_id`; commits if it has settled since.
    pub async fn resume(&self, order_id: &str) -> ExecResult<BookingOutcome> {
        let record = self
            .store
            .payments()
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ExecError::NotFound(format!("payment {}", order_id)))?;

        match record.status {
            PaymentStatus::Completed => self.commit_settled(&record).await,
            PaymentStatus::Failed => Ok(failed(&record)),
            PaymentStatus::Created => {
                Ok(BookingOutcome::PaymentPendingRetry { order_id: order_id.to_string() })
            },
        }
    }

    /// Authoritative commit for a settled payment.
    ///
    /// Idempotent: an already-linked payment yields its match, an
    /// already-flagged payment yields the same conflict.
    pub async fn commit_settled(&self, record: &PaymentRecord) -> ExecResult<BookingOutcome> {
        let order_id = record.external_order_id.as_str();
        let request = &record.booking;
        let span = request.span(self.rules.policy())?;
        let draft = Match::scheduled(request, span, record.id);

        let check = |intervals: &[matchday_domain::BookingInterval]| {
            find_conflict(request, &span, intervals).cloned()
        };

        match self.store.commit_match(order_id, draft, &check).await? {
            CommitOutcome::Committed(committed) => {
                info!(
                    order_id,
                    match_id = %committed.id,
                    venue_id = %committed.venue_id,
                    date = %committed.date,
                    %span,
                    "Booking committed"
                );
                Ok(BookingOutcome::Committed { committed })
            },
            CommitOutcome::AlreadyCommitted(committed) => {
                debug!(order_id, match_id = %committed.id, "Payment already committed");
                Ok(BookingOutcome::Committed { committed })
            },
            CommitOutcome::Conflict(flag) => {
                error!(
                    alert = "post_payment_conflict",
                    order_id,
                    venue_id = %request.venue_id,
                    date = %request.date,
                    %span,
                    conflicting = ?flag.conflicting_span,
                    reason = %flag.reason,
                    "Settled payment lost its slot, flagged for reconciliation"
                );
                Ok(BookingOutcome::BookingConflict {
                    order_id: order_id.to_string(),
                    conflicting_span: flag.conflicting_span,
                    conflicting_match_id: flag.conflicting_match_id,
                })
            },
        }
    }

    /// Flag a settled payment whose commit failed with a permanent error.
    ///
    /// Takes it out of the reconciler's queue and raises the same alert as a
    /// lost slot, so it is refunded or reassigned by hand.
    pub async fn flag_uncommittable(
        &self,
        record: &PaymentRecord,
        cause: &ExecError,
    ) -> ExecResult<BookingOutcome> {
        let order_id = record.external_order_id.as_str();
        let flag = ReconciliationFlag {
            reason: format!("commit failed permanently: {}", cause),
            conflicting_span: None,
            conflicting_match_id: None,
            flagged_at: Utc::now(),
        };
        let flagged = self.store.payments().flag_for_reconciliation(order_id, flag).await?;

        error!(
            alert = "post_payment_conflict",
            order_id,
            venue_id = %record.booking.venue_id,
            date = %record.booking.date,
            start_hour = record.booking.start_hour,
            format = %record.booking.format,
            error = %cause,
            "Settled payment cannot be committed, flagged for reconciliation"
        );

        let (conflicting_span, conflicting_match_id) = flagged
            .reconciliation
            .map(|f| (f.conflicting_span, f.conflicting_match_id))
            .unwrap_or_default();
        Ok(BookingOutcome::BookingConflict {
            order_id: order_id.to_string(),
            conflicting_span,
            conflicting_match_id,
        })
    }

    /// Cancel a scheduled match, freeing its slot.
    ///
    /// The linked payment is left as is; refunds happen at the gateway.
    pub async fn cancel_match(&self, match_id: MatchId, reason: Option<String>) -> ExecResult<Match> {
        let cancelled = self.store.matches().cancel(match_id, reason).await?;
        info!(
            %match_id,
            venue_id = %cancelled.venue_id,
            date = %cancelled.date,
            span = %cancelled.span,
            reason = cancelled.cancellation_reason.as_deref().unwrap_or_default(),
            "Match cancelled"
        );
        Ok(cancelled)
    }
}

fn failed(record: &PaymentRecord) -> BookingOutcome {
    warn!(order_id = %record.external_order_id, "Payment failed, no match created");
    BookingOutcome::PaymentFailed { order_id: record.external_order_id.clone() }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubGateway;
    use matchday_domain::{MatchStatus, Venue};
    use matchday_store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        coordinator: BookingCoordinator<MemoryStore, StubGateway>,
        venue: Venue,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let venue = Venue::new("Riverside Turf", Amount::new(dec!(1200)).unwrap(), 22);
        store.venues().save(&venue).await.unwrap();

        let coordinator = BookingCoordinator::new(
            store.clone(),
            Arc::new(StubGateway::new()),
            BookingRules::default(),
            PollPolicy::new(5, Duration::from_secs(2)),
        );
        Fixture { store, coordinator, venue }
    }

    fn match_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 6, 1).unwrap()
    }

    fn amount() -> Amount {
        Amount::new(dec!(2400)).unwrap()
    }

    async fn pay(f: &Fixture, start: u8) -> String {
        let request = BookingRequest::new(f.venue.id, match_day(), start, MatchFormat::SevenASide);
        let intent = f.coordinator.initiate_payment(&request, amount(), "INR", "rcpt").await.unwrap();
        intent.intent_id
    }

    async fn settle(f: &Fixture, order_id: &str) {
        f.store
            .payments()
            .apply_gateway_status(order_id, PaymentStatus::Completed, Some("pay"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_availability_reflects_commits() {
        let f = fixture().await;
        let order_id = pay(&f, 10).await;
        settle(&f, &order_id).await;
        f.coordinator.resume(&order_id).await.unwrap();

        let starts = f.coordinator.get_availability(f.venue.id, match_day(), 2).await.unwrap();
        assert!(!starts.contains(&9));
        assert!(!starts.contains(&10));
        assert!(!starts.contains(&11));
        assert!(starts.contains(&12));

        let by_format = f
            .coordinator
            .get_availability_for_format(f.venue.id, match_day(), MatchFormat::SevenASide)
            .await
            .unwrap();
        assert_eq!(starts, by_format);
    }

    #[tokio::test]
    async fn test_unknown_venue_availability() {
        let f = fixture().await;
        let result = f.coordinator.get_availability(uuid::Uuid::now_v7(), match_day(), 1).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_initiate_payment_records_created_payment() {
        let f = fixture().await;
        let order_id = pay(&f, 10).await;

        let record = f.store.payments().find_by_order_id(&order_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Created);
        assert_eq!(record.booking.start_hour, 10);
        assert_eq!(record.amount, amount());
    }

    #[tokio::test]
    async fn test_initiate_payment_rejects_taken_slot() {
        let f = fixture().await;
        let first = pay(&f, 10).await;
        settle(&f, &first).await;
        f.coordinator.resume(&first).await.unwrap();

        let request = BookingRequest::new(f.venue.id, match_day(), 9, MatchFormat::SevenASide);
        let err = f.coordinator.initiate_payment(&request, amount(), "INR", "r").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SlotConflict);
        match err {
            ExecError::SlotConflict(conflict) => {
                assert_eq!(conflict.span, HourSpan::new(10, 12).unwrap())
            },
            other => panic!("expected slot conflict, got {:?}", other),
        }
        assert_eq!(f.store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_request_is_validation_error() {
        let f = fixture().await;
        let request = BookingRequest::new(f.venue.id, match_day(), 21, MatchFormat::ElevenASide);
        let err = f.coordinator.validate_booking(&request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_gateway_failure_creates_no_record() {
        let store = Arc::new(MemoryStore::new());
        let venue = Venue::new("Riverside Turf", Amount::new(dec!(1200)).unwrap(), 22);
        store.venues().save(&venue).await.unwrap();
        let gateway = Arc::new(StubGateway::new());
        gateway.set_fail_next(true);
        let coordinator = BookingCoordinator::new(
            store.clone(),
            gateway,
            BookingRules::default(),
            PollPolicy::default(),
        );

        let request = BookingRequest::new(venue.id, match_day(), 10, MatchFormat::FiveASide);
        let err = coordinator.initiate_payment(&request, amount(), "INR", "r").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::GatewayError);
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_payment_commits() {
        let f = fixture().await;
        let order_id = pay(&f, 12).await;
        settle(&f, &order_id).await;

        let outcome = f.coordinator.initiate_and_commit(&order_id, &CancellationToken::new()).await.unwrap();
        let committed = outcome.committed().unwrap();
        assert_eq!(committed.span, HourSpan::new(12, 14).unwrap());
        assert_eq!(committed.status, MatchStatus::Scheduled);
        assert!(outcome.code().is_none());

        let record = f.store.payments().find_by_order_id(&order_id).await.unwrap().unwrap();
        assert_eq!(record.linked_match_id, Some(committed.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_payment_creates_no_match() {
        let f = fixture().await;
        let order_id = pay(&f, 12).await;
        f.store
            .payments()
            .apply_gateway_status(&order_id, PaymentStatus::Failed, None)
            .await
            .unwrap();

        let outcome = f.coordinator.initiate_and_commit(&order_id, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.code(), Some(ErrorCode::PaymentFailed));
        assert_eq!(f.store.match_count().await, 0);
    }

    #[tokio::test]
    async fn test_post_payment_conflict_flags_second_payment() {
        let f = fixture().await;
        // Both pass the advisory check before either commits
        let first = pay(&f, 12).await;
        let second = pay(&f, 12).await;
        settle(&f, &first).await;
        settle(&f, &second).await;

        let a = f.coordinator.resume(&first).await.unwrap();
        let b = f.coordinator.resume(&second).await.unwrap();

        assert!(a.committed().is_some());
        assert_eq!(b.code(), Some(ErrorCode::PostPaymentConflict));

        // Retrying the loser yields the same conflict, no second match
        let again = f.coordinator.resume(&second).await.unwrap();
        assert_eq!(again, b);
        assert_eq!(f.store.match_count().await, 1);
    }

    #[tokio::test]
    async fn test_resume_pending_and_unknown() {
        let f = fixture().await;
        let order_id = pay(&f, 8).await;

        let outcome = f.coordinator.resume(&order_id).await.unwrap();
        assert_eq!(outcome, BookingOutcome::PaymentPendingRetry { order_id: order_id.clone() });
        assert!(outcome.message().contains("try again"));

        let err = f.coordinator.resume("order_missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_match_frees_slot() {
        let f = fixture().await;
        let order_id = pay(&f, 10).await;
        settle(&f, &order_id).await;
        let committed = f.coordinator.resume(&order_id).await.unwrap().committed().unwrap().clone();

        let cancelled = f.coordinator.cancel_match(committed.id, None).await.unwrap();
        assert_eq!(cancelled.status, MatchStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("No reason provided"));

        let starts = f.coordinator.get_availability(f.venue.id, match_day(), 2).await.unwrap();
        assert!(starts.contains(&10));

        let err = f.coordinator.cancel_match(committed.id, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = BookingOutcome::PaymentPendingRetry { order_id: "order_1".to_string() };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "payment_pending_retry");
        assert_eq!(json["order_id"], "order_1");
    }
}
