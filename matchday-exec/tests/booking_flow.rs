//! End-to-end booking flows against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use matchday_domain::{Amount, BookingRequest, MatchFormat, PaymentStatus, Venue};
use matchday_engine::{BookingRules, Verdict};
use matchday_exec::{
    BookingCoordinator, BookingOutcome, CancellationToken, ErrorCode, PollPolicy, Reconciler,
    StubGateway,
};
use matchday_store::{MemoryStore, Store};
use rust_decimal_macros::dec;

type Coordinator = BookingCoordinator<MemoryStore, StubGateway>;

struct Harness {
    store: Arc<MemoryStore>,
    coordinator: Arc<Coordinator>,
    venue: Venue,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let venue = Venue::new("Harbour Arena", Amount::new(dec!(1500)).unwrap(), 14);
    store.venues().save(&venue).await.unwrap();

    let coordinator = Arc::new(BookingCoordinator::new(
        store.clone(),
        Arc::new(StubGateway::new()),
        BookingRules::default(),
        PollPolicy::new(5, Duration::from_secs(2)),
    ));
    Harness { store, coordinator, venue }
}

fn match_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 6, 1).unwrap()
}

fn seven_a_side(h: &Harness, start: u8) -> BookingRequest {
    BookingRequest::new(h.venue.id, match_day(), start, MatchFormat::SevenASide)
}

async fn pay(h: &Harness, start: u8) -> String {
    h.coordinator
        .initiate_payment(&seven_a_side(h, start), Amount::new(dec!(3000)).unwrap(), "INR", "rcpt")
        .await
        .unwrap()
        .intent_id
}

async fn settle(h: &Harness, order_id: &str) {
    h.store
        .payments()
        .apply_gateway_status(order_id, PaymentStatus::Completed, Some("pay_1"))
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_book_then_reject_overlap_then_accept_adjacent() {
    let h = harness().await;

    let order_id = pay(&h, 10).await;
    settle(&h, &order_id).await;
    let outcome = h.coordinator.initiate_and_commit(&order_id, &CancellationToken::new()).await.unwrap();
    let committed = outcome.committed().unwrap().clone();
    assert_eq!(committed.span.to_string(), "[10,12)");

    // [9,11) overlaps the committed [10,12)
    match h.coordinator.validate_booking(&seven_a_side(&h, 9)).await.unwrap() {
        Verdict::Rejected(conflict) => {
            assert_eq!(conflict.span, committed.span);
            assert_eq!(conflict.match_id, committed.id);
        },
        Verdict::Accepted => panic!("overlap accepted"),
    }

    // [12,14) only touches the boundary
    assert!(h.coordinator.validate_booking(&seven_a_side(&h, 12)).await.unwrap().is_accepted());

    let starts = h.coordinator.get_availability(h.venue.id, match_day(), 2).await.unwrap();
    assert!(!starts.contains(&9));
    assert!(starts.contains(&8));
    assert!(starts.contains(&12));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_for_same_slot_exactly_one_wins() {
    for round in 0..25 {
        let h = harness().await;

        // Both pass the advisory check before either commits
        let first = pay(&h, 12).await;
        let second = pay(&h, 12).await;
        settle(&h, &first).await;
        settle(&h, &second).await;

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let spawn = |order_id: String| {
            let coordinator = h.coordinator.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator.initiate_and_commit(&order_id, &CancellationToken::new()).await.unwrap()
            })
        };
        let (a, b) = tokio::join!(spawn(first), spawn(second));
        let outcomes = [a.unwrap(), b.unwrap()];

        let committed = outcomes.iter().filter(|o| o.committed().is_some()).count();
        let conflicts = outcomes
            .iter()
            .filter(|o| o.code() == Some(ErrorCode::PostPaymentConflict))
            .count();
        assert_eq!(committed, 1, "round {}", round);
        assert_eq!(conflicts, 1, "round {}", round);
        assert_eq!(h.store.match_count().await, 1, "round {}", round);
        assert_eq!(h.store.payments().find_flagged().await.unwrap().len(), 1, "round {}", round);
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_settlement_times_out_then_reconciles() {
    let h = harness().await;
    let order_id = pay(&h, 18).await;

    let outcome = h.coordinator.initiate_and_commit(&order_id, &CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, BookingOutcome::PaymentPendingRetry { .. }));
    assert_eq!(outcome.code(), Some(ErrorCode::PaymentTimedOut));
    assert_eq!(h.store.match_count().await, 0);

    // The payment is still on record, waiting for its callback
    let record = h.store.payments().find_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Created);

    // Callback arrives after the caller gave up
    settle(&h, &order_id).await;

    let reconciler = Reconciler::new(h.coordinator.clone(), Duration::from_secs(30));
    let report = reconciler.sweep().await.unwrap();
    assert_eq!(report.committed, 1);

    // A later retry by the caller sees the same match
    let retried = h.coordinator.resume(&order_id).await.unwrap();
    let linked = h.store.payments().find_by_order_id(&order_id).await.unwrap().unwrap();
    assert_eq!(retried.committed().map(|m| m.id), linked.linked_match_id);
    assert_eq!(h.store.match_count().await, 1);
}

#[tokio::test]
async fn test_failed_payment_creates_no_match() {
    let h = harness().await;
    let order_id = pay(&h, 8).await;
    h.store
        .payments()
        .apply_gateway_status(&order_id, PaymentStatus::Failed, None)
        .await
        .unwrap();

    let outcome = h.coordinator.resume(&order_id).await.unwrap();
    assert_eq!(outcome.code(), Some(ErrorCode::PaymentFailed));
    assert_eq!(h.store.match_count().await, 0);
}
