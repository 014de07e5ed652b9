//! Background reconciliation of late settlements.
//!
//! Payments whose callback arrived after the caller stopped polling stay
//! `completed` and unlinked. The reconciler sweeps them periodically and
//! commits each through the coordinator, so none is left behind.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use matchday_store::Store;

use crate::coordinator::{BookingCoordinator, BookingOutcome};
use crate::error::ExecResult;
use crate::ports::PaymentGatewayPort;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Payments examined
    pub scanned: usize,
    /// Matches committed
    pub committed: usize,
    /// Payments flagged for manual reconciliation, lost slots included
    pub conflicts: usize,
    /// Payments whose commit hit a transient error (retried next sweep)
    pub errors: usize,
}

/// Periodic sweeper for settled, unlinked payments.
pub struct Reconciler<S: Store, G: PaymentGatewayPort> {
    coordinator: Arc<BookingCoordinator<S, G>>,
    interval: Duration,
    batch_size: usize,
}

impl<S: Store, G: PaymentGatewayPort> Reconciler<S, G> {
    /// Default batch per sweep
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    /// Create a reconciler sweeping every `interval`.
    pub fn new(coordinator: Arc<BookingCoordinator<S, G>>, interval: Duration) -> Self {
        Self { coordinator, interval, batch_size: Self::DEFAULT_BATCH_SIZE }
    }

    /// Override the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Commit every settled payment that has no match and no flag yet.
    pub async fn sweep(&self) -> ExecResult<ReconcileReport> {
        let pending = self
            .coordinator
            .store()
            .payments()
            .find_settled_unlinked(self.batch_size)
            .await?;

        let mut report = ReconcileReport { scanned: pending.len(), ..Default::default() };

        for record in &pending {
            match self.coordinator.commit_settled(record).await {
                Ok(BookingOutcome::Committed { .. }) => report.committed += 1,
                Ok(BookingOutcome::BookingConflict { .. }) => report.conflicts += 1,
                Ok(other) => {
                    debug!(order_id = %record.external_order_id, ?other, "Unexpected sweep outcome");
                },
                Err(e) if e.is_transient() => {
                    error!(
                        order_id = %record.external_order_id,
                        error = %e,
                        "Reconcile commit failed, will retry"
                    );
                    report.errors += 1;
                },
                Err(e) => match self.coordinator.flag_uncommittable(record, &e).await {
                    Ok(_) => report.conflicts += 1,
                    Err(flag_err) => {
                        error!(
                            order_id = %record.external_order_id,
                            error = %e,
                            flag_error = %flag_err,
                            "Could not flag uncommittable payment, will retry"
                        );
                        report.errors += 1;
                    },
                },
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                committed = report.committed,
                conflicts = report.conflicts,
                errors = report.errors,
                "Reconcile sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep until `shutdown` fires, handing each report to `on_sweep`.
    pub async fn run<F>(&self, shutdown: CancellationToken, mut on_sweep: F)
    where
        F: FnMut(&ReconcileReport) + Send,
    {
        info!(interval_secs = self.interval.as_secs(), "Reconciler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconciler stopped");
                    return;
                },
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) => on_sweep(&report),
                        Err(e) => error!(error = %e, "Reconcile sweep failed"),
                    }
                },
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
