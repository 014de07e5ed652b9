//! One caller's booking flow.
//!
//! Holds the current venue/date selection, the availability shown for it,
//! and the commit phase. Owned by a single task; nothing here is shared.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use matchday_domain::{Amount, BookingRequest, HourSpan, Match, MatchId, PaymentIntent, VenueId};
use matchday_engine::{Generation, GuardedView, View};
use matchday_store::Store;

use crate::coordinator::{BookingCoordinator, BookingOutcome};
use crate::error::{ExecError, ExecResult};
use crate::ports::PaymentGatewayPort;

/// What the caller is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Selected venue
    pub venue_id: VenueId,
    /// Selected date
    pub date: NaiveDate,
    /// Slot length in hours
    pub duration_hours: u8,
}

/// Progress of the pay-then-commit flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitPhase {
    /// Nothing paid yet
    Idle,
    /// Intent created, payment record `created`
    PaymentInitiated {
        /// Gateway order id
        order_id: String,
    },
    /// Polling for settlement
    AwaitingSettlement {
        /// Gateway order id
        order_id: String,
    },
    /// Match committed
    Committed(Match),
    /// Paid but the slot was lost
    Conflict {
        /// Gateway order id
        order_id: String,
        /// Span that took the slot
        conflicting_span: Option<HourSpan>,
        /// Match that took the slot
        conflicting_match_id: Option<MatchId>,
    },
    /// Gateway reported failure
    Failed {
        /// Gateway order id
        order_id: String,
    },
    /// Settlement not seen in time; `confirm` may be called again
    TimedOut {
        /// Gateway order id
        order_id: String,
    },
}

impl CommitPhase {
    /// Order id of the payment in flight, if any
    pub fn order_id(&self) -> Option<&str> {
        match self {
            CommitPhase::Idle | CommitPhase::Committed(_) => None,
            CommitPhase::PaymentInitiated { order_id }
            | CommitPhase::AwaitingSettlement { order_id }
            | CommitPhase::Conflict { order_id, .. }
            | CommitPhase::Failed { order_id }
            | CommitPhase::TimedOut { order_id } => Some(order_id),
        }
    }

    /// Whether the flow has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommitPhase::Committed(_) | CommitPhase::Conflict { .. } | CommitPhase::Failed { .. }
        )
    }

    fn from_outcome(outcome: &BookingOutcome) -> Self {
        match outcome {
            BookingOutcome::Committed { committed } => CommitPhase::Committed(committed.clone()),
            BookingOutcome::BookingConflict { order_id, conflicting_span, conflicting_match_id } => {
                CommitPhase::Conflict {
                    order_id: order_id.clone(),
                    conflicting_span: *conflicting_span,
                    conflicting_match_id: *conflicting_match_id,
                }
            },
            BookingOutcome::PaymentFailed { order_id } => {
                CommitPhase::Failed { order_id: order_id.clone() }
            },
            BookingOutcome::PaymentPendingRetry { order_id } => {
                CommitPhase::TimedOut { order_id: order_id.clone() }
            },
        }
    }
}

/// Session-scoped booking state for one caller.
pub struct BookingSession<S: Store, G: PaymentGatewayPort> {
    coordinator: Arc<BookingCoordinator<S, G>>,
    availability: GuardedView<Selection, Vec<u8>>,
    phase: CommitPhase,
    cancel: CancellationToken,
}

impl<S: Store, G: PaymentGatewayPort> BookingSession<S, G> {
    /// Start an empty session.
    pub fn new(coordinator: Arc<BookingCoordinator<S, G>>) -> Self {
        Self {
            coordinator,
            availability: GuardedView::new(),
            phase: CommitPhase::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Change the selection. Any availability query still in flight for an
    /// earlier selection becomes stale, and the view resets to unknown.
    pub fn select(&mut self, selection: Selection) -> Generation<Selection> {
        debug!(
            venue_id = %selection.venue_id,
            date = %selection.date,
            duration = selection.duration_hours,
            "Selection changed"
        );
        self.availability.select(selection)
    }

    /// Apply an availability result. Returns false if `token` is stale.
    pub fn apply_availability(&mut self, token: &Generation<Selection>, starts: Vec<u8>) -> bool {
        let applied = self.availability.apply(token, starts);
        if !applied {
            debug!(generation = token.generation(), "Discarded stale availability result");
        }
        applied
    }

    /// Query availability for `token`'s selection. The result is not
    /// applied; pass it to `apply_availability`.
    pub async fn fetch_availability(
        coordinator: &BookingCoordinator<S, G>,
        token: &Generation<Selection>,
    ) -> ExecResult<Vec<u8>> {
        let sel = token.key();
        coordinator.get_availability(sel.venue_id, sel.date, sel.duration_hours).await
    }

    /// Select and load availability in one step.
    pub async fn refresh(&mut self, selection: Selection) -> ExecResult<&View<Vec<u8>>> {
        let token = self.select(selection);
        let starts = Self::fetch_availability(&self.coordinator, &token).await?;
        self.apply_availability(&token, starts);
        Ok(self.availability.view())
    }

    /// Availability for the current selection
    pub fn availability(&self) -> &View<Vec<u8>> {
        self.availability.view()
    }

    /// Current selection
    pub fn selection(&self) -> Option<&Selection> {
        self.availability.selection()
    }

    /// Current phase
    pub fn phase(&self) -> &CommitPhase {
        &self.phase
    }

    /// Coordinator this session drives
    pub fn coordinator(&self) -> &Arc<BookingCoordinator<S, G>> {
        &self.coordinator
    }

    /// Token that stops the settlement wait (never the payment).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Create a payment intent for `request`. One payment per session.
    pub async fn start_payment(
        &mut self,
        request: &BookingRequest,
        amount: Amount,
        currency: &str,
        receipt_id: &str,
    ) -> ExecResult<PaymentIntent> {
        if self.phase != CommitPhase::Idle {
            return Err(ExecError::InvalidState(format!(
                "payment already started ({:?})",
                self.phase.order_id()
            )));
        }

        let intent = self.coordinator.initiate_payment(request, amount, currency, receipt_id).await?;
        self.phase = CommitPhase::PaymentInitiated { order_id: intent.intent_id.clone() };
        Ok(intent)
    }

    /// Wait for settlement and commit. Callable again after a timeout.
    pub async fn confirm(&mut self) -> ExecResult<BookingOutcome> {
        let order_id = match &self.phase {
            CommitPhase::PaymentInitiated { order_id } | CommitPhase::TimedOut { order_id } => {
                order_id.clone()
            },
            other => {
                return Err(ExecError::InvalidState(format!("nothing to confirm in {:?}", other)))
            },
        };

        // A previous wait may have been cancelled
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        self.phase = CommitPhase::AwaitingSettlement { order_id: order_id.clone() };
        let outcome = self.coordinator.initiate_and_commit(&order_id, &self.cancel).await;

        match outcome {
            Ok(outcome) => {
                self.phase = CommitPhase::from_outcome(&outcome);
                Ok(outcome)
            },
            Err(e) => {
                // Payment is still recorded; allow another attempt
                self.phase = CommitPhase::TimedOut { order_id };
                Err(e)
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
