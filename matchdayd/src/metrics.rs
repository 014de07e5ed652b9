//! Prometheus metrics for the booking daemon.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use matchday_exec::{BookingOutcome, ReconcileReport};

use crate::error::DaemonResult;

/// Counter: booking outcomes. Labels: outcome.
pub const BOOKING_OUTCOMES_TOTAL: &str = "matchday_booking_outcomes_total";

/// Counter: payment intents created.
pub const PAYMENTS_INITIATED_TOTAL: &str = "matchday_payments_initiated_total";

/// Counter: webhook deliveries. Labels: event, result.
pub const WEBHOOK_EVENTS_TOTAL: &str = "matchday_webhook_events_total";

/// Counter: matches committed by the reconciler.
pub const RECONCILED_TOTAL: &str = "matchday_reconciled_total";

/// Daemon metrics, registered on a private registry.
pub struct Metrics {
    registry: Registry,
    booking_outcomes: IntCounterVec,
    payments_initiated: IntCounter,
    webhook_events: IntCounterVec,
    reconciled: IntCounter,
}

impl Metrics {
    /// Create and register all collectors.
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let booking_outcomes = IntCounterVec::new(
            Opts::new(BOOKING_OUTCOMES_TOTAL, "Booking outcomes by kind"),
            &["outcome"],
        )?;
        let payments_initiated =
            IntCounter::new(PAYMENTS_INITIATED_TOTAL, "Payment intents created")?;
        let webhook_events = IntCounterVec::new(
            Opts::new(WEBHOOK_EVENTS_TOTAL, "Gateway webhook deliveries"),
            &["event", "result"],
        )?;
        let reconciled = IntCounter::new(RECONCILED_TOTAL, "Matches committed by the reconciler")?;

        registry.register(Box::new(booking_outcomes.clone()))?;
        registry.register(Box::new(payments_initiated.clone()))?;
        registry.register(Box::new(webhook_events.clone()))?;
        registry.register(Box::new(reconciled.clone()))?;

        Ok(Self { registry, booking_outcomes, payments_initiated, webhook_events, reconciled })
    }

    /// Count one booking outcome.
    pub fn record_outcome(&self, outcome: &BookingOutcome) {
        self.booking_outcomes.with_label_values(&[outcome_label(outcome)]).inc();
    }

    /// Count one payment intent.
    pub fn record_payment_initiated(&self) {
        self.payments_initiated.inc();
    }

    /// Count one webhook delivery.
    pub fn record_webhook(&self, event: &str, result: &str) {
        self.webhook_events.with_label_values(&[event, result]).inc();
    }

    /// Count the commits of one reconciler sweep.
    pub fn record_sweep(&self, report: &ReconcileReport) {
        self.reconciled.inc_by(report.committed as u64);
    }

    /// Render all metrics in the text exposition format.
    pub fn render(&self) -> DaemonResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Map an outcome to a short label.
pub fn outcome_label(outcome: &BookingOutcome) -> &'static str {
    match outcome {
        BookingOutcome::Committed { .. } => "committed",
        BookingOutcome::BookingConflict { .. } => "booking_conflict",
        BookingOutcome::PaymentFailed { .. } => "payment_failed",
        BookingOutcome::PaymentPendingRetry { .. } => "payment_pending_retry",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_payment_initiated();
        metrics.record_outcome(&BookingOutcome::PaymentFailed { order_id: "o".into() });
        metrics.record_webhook("payment.captured", "processed");

        let text = metrics.render().unwrap();
        assert!(text.contains("matchday_payments_initiated_total 1"));
        assert!(text.contains(r#"matchday_booking_outcomes_total{outcome="payment_failed"} 1"#));
        assert!(text.contains(WEBHOOK_EVENTS_TOTAL));
    }

    #[test]
    fn test_sweep_adds_committed() {
        let metrics = Metrics::new().unwrap();
        metrics.record_sweep(&ReconcileReport { scanned: 3, committed: 2, ..Default::default() });
        assert!(metrics.render().unwrap().contains("matchday_reconciled_total 2"));
    }
}
