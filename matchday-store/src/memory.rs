//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Concurrent commits on the same venue and date are serialised by a
//! per-key async mutex held across read-check-insert.

use crate::error::StoreError;
use crate::repository::{
    conflict_flag, BookingRepository, CommitOutcome, ConflictCheck, MatchRepository,
    PaymentRepository, Store, VenueRepository,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use matchday_domain::{
    BookingInterval, Match, MatchId, PaymentRecord, PaymentStatus, ReconciliationFlag, Venue,
    VenueId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

type SlotKey = (VenueId, NaiveDate);

/// In-memory store for testing
pub struct MemoryStore {
    venues: RwLock<HashMap<VenueId, Venue>>,
    matches: RwLock<HashMap<MatchId, Match>>,
    /// Keyed by external order id
    payments: RwLock<HashMap<String, PaymentRecord>>,
    slot_locks: Mutex<HashMap<SlotKey, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            venues: RwLock::new(HashMap::new()),
            matches: RwLock::new(HashMap::new()),
            payments: RwLock::new(HashMap::new()),
            slot_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the number of matches, any status
    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }

    /// Get the number of payment records
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Clear all data (useful for test setup)
    pub async fn clear(&self) {
        self.venues.write().await.clear();
        self.matches.write().await.clear();
        self.payments.write().await.clear();
        self.slot_locks.lock().await.clear();
    }

    async fn slot_lock(&self, key: SlotKey) -> Arc<Mutex<()>> {
        let mut locks = self.slot_locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    /// Drop the lock for `key` once no commit holds or awaits it.
    ///
    /// Clones are only taken under the map lock, so a count of one (the
    /// map's own) means nobody can be waiting on this mutex.
    async fn release_slot_lock(&self, key: SlotKey) {
        let mut locks = self.slot_locks.lock().await;
        if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&key);
        }
    }

    #[cfg(test)]
    async fn slot_lock_count(&self) -> usize {
        self.slot_locks.lock().await.len()
    }

    async fn commit_locked(
        &self,
        order_id: &str,
        draft: Match,
        check: &ConflictCheck<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let record = self
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        if !record.is_settled() {
            return Err(StoreError::invalid_state(format!(
                "payment {} is {}, cannot commit",
                order_id, record.status
            )));
        }
        if record.id != draft.payment_id {
            return Err(StoreError::invalid_state(format!(
                "match draft references payment {}, not {}",
                draft.payment_id, record.id
            )));
        }

        if let Some(match_id) = record.linked_match_id {
            let existing = MatchRepository::find_by_id(self, match_id)
                .await?
                .ok_or_else(|| StoreError::not_found("match", match_id.to_string()))?;
            return Ok(CommitOutcome::AlreadyCommitted(existing));
        }
        if let Some(flag) = record.reconciliation {
            return Ok(CommitOutcome::Conflict(flag));
        }

        let intervals = self.occupying(draft.venue_id, draft.date).await;
        if let Some(conflict) = check(&intervals) {
            let flag = conflict_flag(&conflict);
            warn!(order_id, conflicting = %conflict.span, "Commit lost slot, flagging payment");

            let mut payments = self.payments.write().await;
            if let Some(stored) = payments.get_mut(order_id) {
                stored.flag_for_reconciliation(flag.clone());
            }
            return Ok(CommitOutcome::Conflict(flag));
        }

        // Link first so a domain rejection leaves no orphan match behind
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;
        stored.link_match(draft.id)?;
        drop(payments);

        self.matches.write().await.insert(draft.id, draft.clone());
        debug!(order_id, match_id = %draft.id, span = %draft.span, "Match committed");
        Ok(CommitOutcome::Committed(draft))
    }

    async fn occupying(&self, venue_id: VenueId, date: NaiveDate) -> Vec<BookingInterval> {
        let matches = self.matches.read().await;
        let mut intervals: Vec<BookingInterval> = matches
            .values()
            .filter(|m| m.venue_id == venue_id && m.date == date && m.status.is_occupying())
            .map(Match::interval)
            .collect();
        intervals.sort_by_key(|i| i.span);
        intervals
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Venue Repository Implementation
// =============================================================================

#[async_trait]
impl VenueRepository for MemoryStore {
    async fn save(&self, venue: &Venue) -> Result<(), StoreError> {
        self.venues.write().await.insert(venue.id, venue.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: VenueId) -> Result<Option<Venue>, StoreError> {
        Ok(self.venues.read().await.get(&id).cloned())
    }
}

// =============================================================================
// Booking Repository Implementation
// =============================================================================

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn find_occupying(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<BookingInterval>, StoreError> {
        Ok(self.occupying(venue_id, date).await)
    }
}

// =============================================================================
// Payment Repository Implementation
// =============================================================================

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&record.external_order_id) {
            return Err(StoreError::duplicate("payment", &record.external_order_id));
        }
        payments.insert(record.external_order_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.payments.read().await.get(order_id).cloned())
    }

    async fn apply_gateway_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        external_payment_id: Option<&str>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut payments = self.payments.write().await;
        let record = payments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        let changed = record.apply_gateway_status(status, external_payment_id)?;
        if !changed {
            debug!(order_id, %status, "Duplicate gateway callback ignored");
        }
        Ok(record.clone())
    }

    async fn find_settled_unlinked(&self, limit: usize) -> Result<Vec<PaymentRecord>, StoreError> {
        let payments = self.payments.read().await;
        let mut pending: Vec<PaymentRecord> =
            payments.values().filter(|p| p.awaits_commit()).cloned().collect();
        pending.sort_by_key(|p| p.updated_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn flag_for_reconciliation(
        &self,
        order_id: &str,
        flag: ReconciliationFlag,
    ) -> Result<PaymentRecord, StoreError> {
        let mut payments = self.payments.write().await;
        let record = payments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        if let Some(match_id) = record.linked_match_id {
            return Err(StoreError::invalid_state(format!(
                "payment {} is linked to match {}, cannot flag",
                order_id, match_id
            )));
        }
        if record.reconciliation.is_none() {
            record.flag_for_reconciliation(flag);
        }
        Ok(record.clone())
    }

    async fn find_flagged(&self) -> Result<Vec<PaymentRecord>, StoreError> {
        let payments = self.payments.read().await;
        Ok(payments.values().filter(|p| p.reconciliation.is_some()).cloned().collect())
    }
}

// =============================================================================
// Match Repository Implementation
// =============================================================================

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.read().await.get(&id).cloned())
    }

    async fn find_by_venue_date(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Match>, StoreError> {
        let matches = self.matches.read().await;
        let mut found: Vec<Match> = matches
            .values()
            .filter(|m| m.venue_id == venue_id && m.date == date)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.span);
        Ok(found)
    }

    async fn cancel(&self, id: MatchId, reason: Option<String>) -> Result<Match, StoreError> {
        let mut matches = self.matches.write().await;
        let m = matches
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("match", id.to_string()))?;
        m.cancel(reason)?;
        Ok(m.clone())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for MemoryStore {
    fn venues(&self) -> &dyn VenueRepository {
        self
    }

    fn bookings(&self) -> &dyn BookingRepository {
        self
    }

    fn payments(&self) -> &dyn PaymentRepository {
        self
    }

    fn matches(&self) -> &dyn MatchRepository {
        self
    }

    async fn commit_match(
        &self,
        order_id: &str,
        draft: Match,
        check: &ConflictCheck<'_>,
    ) -> Result<CommitOutcome, StoreError> {
        let key = (draft.venue_id, draft.date);
        let lock = self.slot_lock(key).await;
        let outcome = {
            let _held = lock.lock().await;
            self.commit_locked(order_id, draft, check).await
        };
        drop(lock);
        self.release_slot_lock(key).await;
        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matchday_domain::{
        Amount, BookingRequest, DomainError, HourSpan, MatchFormat, MatchStatus, PaymentIntent,
    };
    use rust_decimal_macros::dec;

    fn match_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 6, 1).unwrap()
    }

    async fn seeded() -> (Arc<MemoryStore>, Venue) {
        let store = Arc::new(MemoryStore::new());
        let venue = Venue::new("Riverside Turf", Amount::new(dec!(1200)).unwrap(), 22);
        store.venues().save(&venue).await.unwrap();
        (store, venue)
    }

    async fn settled_payment(store: &MemoryStore, venue: &Venue, order_id: &str, start: u8) -> PaymentRecord {
        let intent = PaymentIntent {
            intent_id: order_id.to_string(),
            amount: Amount::new(dec!(2400)).unwrap(),
            currency: "INR".to_string(),
            receipt_id: format!("rcpt_{}", order_id),
            created_at: Utc::now(),
        };
        let request = BookingRequest::new(venue.id, match_day(), start, MatchFormat::SevenASide);
        let record = PaymentRecord::new(&intent, request);
        store.payments().insert(&record).await.unwrap();
        store
            .payments()
            .apply_gateway_status(order_id, PaymentStatus::Completed, Some("pay_x"))
            .await
            .unwrap()
    }

    fn draft(record: &PaymentRecord) -> Match {
        let span = HourSpan::starting_at(record.booking.start_hour, 2).unwrap();
        Match::scheduled(&record.booking, span, record.id)
    }

    fn overlap_check(span: HourSpan) -> impl Fn(&[BookingInterval]) -> Option<BookingInterval> + Send + Sync {
        move |intervals: &[BookingInterval]| {
            intervals.iter().find(|i| i.span.overlaps(&span)).cloned()
        }
    }

    #[tokio::test]
    async fn test_commit_links_payment() {
        let (store, venue) = seeded().await;
        let record = settled_payment(&store, &venue, "order_1", 10).await;
        let m = draft(&record);

        let outcome = store.commit_match("order_1", m.clone(), &overlap_check(m.span)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed(m.clone()));

        let stored = store.payments().find_by_order_id("order_1").await.unwrap().unwrap();
        assert_eq!(stored.linked_match_id, Some(m.id));

        let occupying = store.bookings().find_occupying(venue.id, match_day()).await.unwrap();
        assert_eq!(occupying.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent_per_payment() {
        let (store, venue) = seeded().await;
        let record = settled_payment(&store, &venue, "order_1", 10).await;
        let first = draft(&record);
        store.commit_match("order_1", first.clone(), &overlap_check(first.span)).await.unwrap();

        let retry = draft(&record);
        let outcome = store.commit_match("order_1", retry.clone(), &overlap_check(retry.span)).await.unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyCommitted(first));
        assert_eq!(store.match_count().await, 1);
    }

    #[tokio::test]
    async fn test_conflict_flags_payment() {
        let (store, venue) = seeded().await;
        let winner = settled_payment(&store, &venue, "order_a", 12).await;
        let loser = settled_payment(&store, &venue, "order_b", 12).await;

        let w = draft(&winner);
        store.commit_match("order_a", w.clone(), &overlap_check(w.span)).await.unwrap();

        let l = draft(&loser);
        let outcome = store.commit_match("order_b", l.clone(), &overlap_check(l.span)).await.unwrap();
        let flag = match outcome {
            CommitOutcome::Conflict(flag) => flag,
            other => panic!("expected conflict, got {:?}", other),
        };
        assert_eq!(flag.conflicting_match_id, Some(w.id));

        let stored = store.payments().find_by_order_id("order_b").await.unwrap().unwrap();
        assert!(stored.reconciliation.is_some());
        assert!(stored.linked_match_id.is_none());
        assert_eq!(store.payments().find_flagged().await.unwrap().len(), 1);
        assert!(store.payments().find_settled_unlinked(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_exactly_one_wins() {
        for round in 0..50 {
            let (store, venue) = seeded().await;
            let a = settled_payment(&store, &venue, "order_a", 12).await;
            let b = settled_payment(&store, &venue, "order_b", 13).await;

            let barrier = Arc::new(tokio::sync::Barrier::new(2));
            let spawn_commit = |record: PaymentRecord| {
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    let m = draft(&record);
                    let check = overlap_check(m.span);
                    barrier.wait().await;
                    store.commit_match(&record.external_order_id, m, &check).await.unwrap()
                })
            };

            let (ra, rb) = tokio::join!(spawn_commit(a), spawn_commit(b));
            let outcomes = [ra.unwrap(), rb.unwrap()];

            let committed = outcomes.iter().filter(|o| matches!(o, CommitOutcome::Committed(_))).count();
            let conflicts = outcomes.iter().filter(|o| matches!(o, CommitOutcome::Conflict(_))).count();
            assert_eq!(committed, 1, "round {}", round);
            assert_eq!(conflicts, 1, "round {}", round);
            assert_eq!(store.match_count().await, 1, "round {}", round);
            assert_eq!(store.payments().find_flagged().await.unwrap().len(), 1, "round {}", round);
            assert_eq!(store.slot_lock_count().await, 0, "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_slot_locks_released_after_commit() {
        let (store, venue) = seeded().await;
        for (i, start) in [8u8, 10, 12].into_iter().enumerate() {
            let order_id = format!("order_{}", i);
            let record = settled_payment(&store, &venue, &order_id, start).await;
            let m = draft(&record);
            store.commit_match(&order_id, m.clone(), &overlap_check(m.span)).await.unwrap();
        }
        assert_eq!(store.match_count().await, 3);
        assert_eq!(store.slot_lock_count().await, 0);

        // Errors release the lock too
        let record = settled_payment(&store, &venue, "order_x", 16).await;
        let other = settled_payment(&store, &venue, "order_y", 18).await;
        let mut m = draft(&record);
        m.payment_id = other.id;
        let result = store.commit_match("order_x", m.clone(), &overlap_check(m.span)).await;
        assert!(matches!(result, Err(StoreError::InvalidState { .. })));
        assert_eq!(store.slot_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_flag_for_reconciliation() {
        let (store, venue) = seeded().await;
        settled_payment(&store, &venue, "order_1", 10).await;

        let flag = |reason: &str| ReconciliationFlag {
            reason: reason.to_string(),
            conflicting_span: None,
            conflicting_match_id: None,
            flagged_at: Utc::now(),
        };

        let flagged = store.payments().flag_for_reconciliation("order_1", flag("first")).await.unwrap();
        assert_eq!(flagged.reconciliation.as_ref().map(|f| f.reason.as_str()), Some("first"));
        assert!(store.payments().find_settled_unlinked(10).await.unwrap().is_empty());

        // First flag wins
        let again = store.payments().flag_for_reconciliation("order_1", flag("second")).await.unwrap();
        assert_eq!(again.reconciliation.as_ref().map(|f| f.reason.as_str()), Some("first"));

        // Linked payments cannot be flagged
        let linked = settled_payment(&store, &venue, "order_2", 14).await;
        let m = draft(&linked);
        store.commit_match("order_2", m.clone(), &overlap_check(m.span)).await.unwrap();
        let result = store.payments().flag_for_reconciliation("order_2", flag("late")).await;
        assert!(matches!(result, Err(StoreError::InvalidState { .. })));

        let missing = store.payments().flag_for_reconciliation("nope", flag("x")).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_commit_requires_settled_payment() {
        let (store, venue) = seeded().await;
        let intent = PaymentIntent {
            intent_id: "order_pending".to_string(),
            amount: Amount::new(dec!(1200)).unwrap(),
            currency: "INR".to_string(),
            receipt_id: "rcpt".to_string(),
            created_at: Utc::now(),
        };
        let request = BookingRequest::new(venue.id, match_day(), 8, MatchFormat::FiveASide);
        let record = PaymentRecord::new(&intent, request);
        store.payments().insert(&record).await.unwrap();

        let m = draft(&record);
        let result = store.commit_match("order_pending", m.clone(), &overlap_check(m.span)).await;
        assert!(matches!(result, Err(StoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_gateway_status_rules() {
        let (store, venue) = seeded().await;
        settled_payment(&store, &venue, "order_1", 10).await;

        // Duplicate delivery returns the same record
        let again = store
            .payments()
            .apply_gateway_status("order_1", PaymentStatus::Completed, Some("pay_x"))
            .await
            .unwrap();
        assert_eq!(again.status, PaymentStatus::Completed);

        let flip = store.payments().apply_gateway_status("order_1", PaymentStatus::Failed, None).await;
        assert!(matches!(flip, Err(StoreError::Domain(DomainError::InvalidStateTransition(_)))));

        let missing = store.payments().apply_gateway_status("nope", PaymentStatus::Failed, None).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_order_id_rejected() {
        let (store, venue) = seeded().await;
        let record = settled_payment(&store, &venue, "order_1", 10).await;
        let result = store.payments().insert(&record).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_cancel_frees_slot() {
        let (store, venue) = seeded().await;
        let record = settled_payment(&store, &venue, "order_1", 10).await;
        let m = draft(&record);
        store.commit_match("order_1", m.clone(), &overlap_check(m.span)).await.unwrap();

        let cancelled = store.matches().cancel(m.id, Some("rain".to_string())).await.unwrap();
        assert_eq!(cancelled.status, MatchStatus::Cancelled);
        assert!(store.bookings().find_occupying(venue.id, match_day()).await.unwrap().is_empty());
        assert_eq!(store.matches().find_by_venue_date(venue.id, match_day()).await.unwrap().len(), 1);

        let again = store.matches().cancel(m.id, None).await;
        assert!(matches!(again, Err(StoreError::Domain(_))));
    }
}
