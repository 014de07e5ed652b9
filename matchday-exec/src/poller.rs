//! Payment settlement polling.
//!
//! Reads the PaymentRecord a bounded number of times. Sleeps happen only
//! between reads, so the wait is at most `(attempts - 1) * interval` plus
//! read latency. Cancelling the wait never cancels the payment.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use matchday_domain::{PaymentRecord, PaymentStatus};
use matchday_store::Store;

/// Bounds for one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    attempts: u32,
    interval: Duration,
}

impl PollPolicy {
    /// Default number of reads
    pub const DEFAULT_ATTEMPTS: u32 = 5;
    /// Default pause between reads
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Create a policy; at least one read is always made.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts: attempts.max(1), interval }
    }

    /// Number of reads
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between reads
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on time spent sleeping, saturating at `Duration::MAX`
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.attempts - 1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Gateway captured the payment
    Settled(PaymentRecord),
    /// Gateway reported failure
    Failed(PaymentRecord),
    /// Still `created` (or not yet visible) after every attempt; retryable
    TimedOut {
        /// Reads made
        attempts: u32,
    },
    /// Caller stopped waiting
    Cancelled,
}

/// Polls the store for a payment's settlement.
pub struct PaymentPoller<S: Store> {
    store: Arc<S>,
    policy: PollPolicy,
}

impl<S: Store> PaymentPoller<S> {
    /// Create a new poller.
    pub fn new(store: Arc<S>, policy: PollPolicy) -> Self {
        Self { store, policy }
    }

    /// Policy in force
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Poll until the payment reaches a terminal status, attempts run out,
    /// or `cancel` fires.
    ///
    /// Store read errors are logged and consume an attempt.
    pub async fn poll(&self, order_id: &str, cancel: &CancellationToken) -> PollOutcome {
        let attempts = self.policy.attempts;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                info!(order_id, attempt, "Payment polling cancelled");
                return PollOutcome::Cancelled;
            }

            match self.store.payments().find_by_order_id(order_id).await {
                Ok(Some(record)) => match record.status {
                    PaymentStatus::Completed => {
                        info!(order_id, attempt, "Payment settled");
                        return PollOutcome::Settled(record);
                    },
                    PaymentStatus::Failed => {
                        info!(order_id, attempt, "Payment failed");
                        return PollOutcome::Failed(record);
                    },
                    PaymentStatus::Created => {
                        debug!(order_id, attempt, attempts, "Payment still processing");
                    },
                },
                Ok(None) => {
                    // Treated as processing: the record may not be visible yet
                    debug!(order_id, attempt, attempts, "Payment record not found yet");
                },
                Err(e) => {
                    warn!(order_id, attempt, attempts, error = %e, "Payment status read failed");
                },
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(order_id, attempt, "Payment polling cancelled");
                        return PollOutcome::Cancelled;
                    },
                    _ = tokio::time::sleep(self.policy.interval) => {},
                }
            }
        }

        info!(order_id, attempts, "Payment not settled within polling window");
        PollOutcome::TimedOut { attempts }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use matchday_domain::{
        Amount, BookingRequest, MatchFormat, PaymentIntent, ReconciliationFlag, Venue, VenueId,
    };
    use matchday_store::{
        BookingRepository, CommitOutcome, ConflictCheck, MatchRepository, MemoryStore,
        PaymentRepository, StoreError, VenueRepository,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    async fn store_with_payment(order_id: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let venue = Venue::new("Riverside Turf", Amount::new(dec!(1200)).unwrap(), 22);
        store.venues().save(&venue).await.unwrap();

        let intent = PaymentIntent {
            intent_id: order_id.to_string(),
            amount: Amount::new(dec!(1200)).unwrap(),
            currency: "INR".to_string(),
            receipt_id: "rcpt".to_string(),
            created_at: Utc::now(),
        };
        let request = BookingRequest::new(
            venue.id,
            NaiveDate::from_ymd_opt(2099, 6, 1).unwrap(),
            10,
            MatchFormat::FiveASide,
        );
        store.payments().insert(&PaymentRecord::new(&intent, request)).await.unwrap();
        store
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(5, Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_bound() {
        let store = store_with_payment("order_1").await;
        let poller = PaymentPoller::new(store.clone(), policy());

        let started = Instant::now();
        let outcome = poller.poll("order_1", &CancellationToken::new()).await;

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(started.elapsed(), Duration::from_secs(8));

        let record = store.payments().find_by_order_id("order_1").await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_when_callback_arrives_mid_poll() {
        let store = store_with_payment("order_1").await;
        let poller = PaymentPoller::new(store.clone(), policy());

        let callback_store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            callback_store
                .payments()
                .apply_gateway_status("order_1", PaymentStatus::Completed, Some("pay_1"))
                .await
                .unwrap();
        });

        let started = Instant::now();
        let outcome = poller.poll("order_1", &CancellationToken::new()).await;

        match outcome {
            PollOutcome::Settled(record) => {
                assert_eq!(record.external_payment_id.as_deref(), Some("pay_1"))
            },
            other => panic!("expected settled, got {:?}", other),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_payment_is_terminal() {
        let store = store_with_payment("order_1").await;
        store
            .payments()
            .apply_gateway_status("order_1", PaymentStatus::Failed, None)
            .await
            .unwrap();

        let poller = PaymentPoller::new(store, policy());
        let outcome = poller.poll("order_1", &CancellationToken::new()).await;
        assert!(matches!(outcome, PollOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_counts_as_processing() {
        let store = Arc::new(MemoryStore::new());
        let poller = PaymentPoller::new(store, PollPolicy::new(3, Duration::from_millis(500)));

        let outcome = poller.poll("order_unknown", &CancellationToken::new()).await;
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_waiting() {
        let store = store_with_payment("order_1").await;
        let poller = PaymentPoller::new(store, policy());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = poller.poll("order_1", &cancel).await;
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_policy_bounds() {
        assert_eq!(PollPolicy::default().max_wait(), Duration::from_secs(8));
        assert_eq!(PollPolicy::new(0, Duration::from_secs(1)).attempts(), 1);
        assert_eq!(PollPolicy::new(1, Duration::MAX).max_wait(), Duration::ZERO);
    }

    #[test]
    fn test_max_wait_saturates() {
        let policy = PollPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.max_wait(), Duration::MAX);
    }

    /// Store whose payment reads fail a fixed number of times first.
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl PaymentRepository for FlakyStore {
        async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError> {
            self.inner.insert(record).await
        }

        async fn find_by_order_id(
            &self,
            order_id: &str,
        ) -> Result<Option<PaymentRecord>, StoreError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Connection("connection reset".to_string()));
            }
            self.inner.find_by_order_id(order_id).await
        }

        async fn apply_gateway_status(
            &self,
            order_id: &str,
            status: PaymentStatus,
            external_payment_id: Option<&str>,
        ) -> Result<PaymentRecord, StoreError> {
            self.inner.apply_gateway_status(order_id, status, external_payment_id).await
        }

        async fn find_settled_unlinked(
            &self,
            limit: usize,
        ) -> Result<Vec<PaymentRecord>, StoreError> {
            self.inner.find_settled_unlinked(limit).await
        }

        async fn flag_for_reconciliation(
            &self,
            order_id: &str,
            flag: ReconciliationFlag,
        ) -> Result<PaymentRecord, StoreError> {
            self.inner.flag_for_reconciliation(order_id, flag).await
        }

        async fn find_flagged(&self) -> Result<Vec<PaymentRecord>, StoreError> {
            self.inner.find_flagged().await
        }
    }

    #[async_trait]
    impl Store for FlakyStore {
        fn venues(&self) -> &dyn VenueRepository {
            &self.inner
        }

        fn bookings(&self) -> &dyn BookingRepository {
            &self.inner
        }

        fn payments(&self) -> &dyn PaymentRepository {
            self
        }

        fn matches(&self) -> &dyn MatchRepository {
            &self.inner
        }

        async fn commit_match(
            &self,
            order_id: &str,
            draft: matchday_domain::Match,
            check: &ConflictCheck<'_>,
        ) -> Result<CommitOutcome, StoreError> {
            self.inner.commit_match(order_id, draft, check).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_errors_consume_attempts() {
        let venue_id: VenueId = uuid::Uuid::now_v7();
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(2),
        });
        let intent = PaymentIntent {
            intent_id: "order_1".to_string(),
            amount: Amount::new(dec!(800)).unwrap(),
            currency: "INR".to_string(),
            receipt_id: "rcpt".to_string(),
            created_at: Utc::now(),
        };
        let request = BookingRequest::new(
            venue_id,
            NaiveDate::from_ymd_opt(2099, 6, 1).unwrap(),
            10,
            MatchFormat::FiveASide,
        );
        store.payments().insert(&PaymentRecord::new(&intent, request)).await.unwrap();
        store
            .payments()
            .apply_gateway_status("order_1", PaymentStatus::Completed, None)
            .await
            .unwrap();

        // Two failed reads, settled on the third
        let poller = PaymentPoller::new(store.clone(), policy());
        let started = Instant::now();
        let outcome = poller.poll("order_1", &CancellationToken::new()).await;
        assert!(matches!(outcome, PollOutcome::Settled(_)));
        assert_eq!(started.elapsed(), Duration::from_secs(4));

        // Errors on every read exhaust the attempts
        store.failures_left.store(10, Ordering::SeqCst);
        let outcome = poller.poll("order_1", &CancellationToken::new()).await;
        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
    }
}
