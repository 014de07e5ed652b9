//! Domain Entities for Matchday
//!
//! Venues, booked intervals, payments and matches.
//! All entities have identity and explicit lifecycle transitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::format::{DurationPolicy, MatchFormat};
use crate::interval::HourSpan;
use crate::value_objects::{Amount, DomainError};

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a Venue
pub type VenueId = Uuid;

/// Unique identifier for a Match
pub type MatchId = Uuid;

/// Unique identifier for a PaymentRecord
pub type PaymentId = Uuid;

// =============================================================================
// Venue
// =============================================================================

/// A bookable pitch. Immutable for the duration of a booking flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    /// Venue identifier
    pub id: VenueId,
    /// Display name
    pub name: String,
    /// Rate per booked hour; pricing itself happens outside the engine
    pub hourly_rate: Amount,
    /// Squad capacity
    pub capacity: u32,
    /// Inactive venues accept no bookings
    pub active: bool,
}

impl Venue {
    /// Create a new active venue
    pub fn new(name: impl Into<String>, hourly_rate: Amount, capacity: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            hourly_rate,
            capacity,
            active: true,
        }
    }
}

// =============================================================================
// Match Status
// =============================================================================

/// Lifecycle of a booked match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Booked, not yet played
    Scheduled,
    /// Being played right now
    Ongoing,
    /// Played out
    Completed,
    /// Called off; frees the slot
    Cancelled,
}

impl MatchStatus {
    /// Only scheduled and ongoing matches hold their slot.
    pub fn is_occupying(&self) -> bool {
        matches!(self, MatchStatus::Scheduled | MatchStatus::Ongoing)
    }

    /// Storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Ongoing => "ongoing",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for MatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "ongoing" => Ok(MatchStatus::Ongoing),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Booking Interval
// =============================================================================

/// A booked range of hours on one venue and date, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInterval {
    /// Venue the slot belongs to
    pub venue_id: VenueId,
    /// Day of the booking
    pub date: NaiveDate,
    /// Booked hours
    pub span: HourSpan,
    /// Match holding the slot
    pub match_id: MatchId,
    /// Status of that match
    pub status: MatchStatus,
}

impl BookingInterval {
    /// First booked hour
    pub fn start_hour(&self) -> u8 {
        self.span.start()
    }

    /// Booked hours
    pub fn duration_hours(&self) -> u8 {
        self.span.duration_hours()
    }

    /// Whether this interval blocks other bookings
    pub fn is_occupying(&self) -> bool {
        self.status.is_occupying()
    }
}

// =============================================================================
// Booking Request
// =============================================================================

/// A caller's request for a slot. Ephemeral until commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Requested venue
    pub venue_id: VenueId,
    /// Requested day
    pub date: NaiveDate,
    /// First hour, 0-23
    pub start_hour: u8,
    /// Format, which fixes the duration
    pub format: MatchFormat,
}

impl BookingRequest {
    /// Create a request
    pub fn new(venue_id: VenueId, date: NaiveDate, start_hour: u8, format: MatchFormat) -> Self {
        Self { venue_id, date, start_hour, format }
    }

    /// The hours this request would occupy under `policy`.
    ///
    /// # Errors
    /// Returns `DomainError` if the policy duration is out of range or the
    /// span runs past midnight.
    pub fn span(&self, policy: &dyn DurationPolicy) -> Result<HourSpan, DomainError> {
        let hours = policy.checked_duration(self.format)?;
        HourSpan::starting_at(self.start_hour, hours)
    }
}

// =============================================================================
// Payment Intent
// =============================================================================

/// An order created at the external gateway before commit. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// External order id assigned by the gateway
    pub intent_id: String,
    /// Amount charged
    pub amount: Amount,
    /// ISO currency code
    pub currency: String,
    /// Caller-supplied receipt reference
    pub receipt_id: String,
    /// When the gateway created the order
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Status
// =============================================================================

/// Settlement status, written only by the gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Order created, settlement unknown
    Created,
    /// Gateway captured the payment
    Completed,
    /// Gateway reported failure
    Failed,
}

impl PaymentStatus {
    /// Completed and failed never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Created)
    }

    /// Storage string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Record
// =============================================================================

/// Marks a settled payment whose slot was lost to a concurrent commit.
///
/// Needs a human: refund or reassign to another slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationFlag {
    /// Why the payment needs manual handling
    pub reason: String,
    /// Span that took the slot, if a conflict caused the flag
    pub conflicting_span: Option<HourSpan>,
    /// Match that took the slot, if any
    pub conflicting_match_id: Option<MatchId>,
    /// When the flag was raised
    pub flagged_at: DateTime<Utc>,
}

/// Persistent record of a payment and the booking it pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Internal payment id
    pub id: PaymentId,
    /// Gateway order id
    pub external_order_id: String,
    /// Gateway payment id, known once captured or failed
    pub external_payment_id: Option<String>,
    /// Settlement status
    pub status: PaymentStatus,
    /// Set once, by the commit coordinator
    pub linked_match_id: Option<MatchId>,
    /// Booking this payment is for
    pub booking: BookingRequest,
    /// Amount charged
    pub amount: Amount,
    /// ISO currency code
    pub currency: String,
    /// Set when the payment needs refund or reassignment
    pub reconciliation: Option<ReconciliationFlag>,
    /// When the intent was recorded
    pub created_at: DateTime<Utc>,
    /// Last status, link, or flag change
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Record a freshly created intent in `created` status
    pub fn new(intent: &PaymentIntent, booking: BookingRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            external_order_id: intent.intent_id.clone(),
            external_payment_id: None,
            status: PaymentStatus::Created,
            linked_match_id: None,
            booking,
            amount: intent.amount,
            currency: intent.currency.clone(),
            reconciliation: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Gateway confirmed settlement
    pub fn is_settled(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Settled, but neither linked to a match nor flagged for a human.
    pub fn awaits_commit(&self) -> bool {
        self.is_settled() && self.linked_match_id.is_none() && self.reconciliation.is_none()
    }

    /// Apply a gateway callback.
    ///
    /// Returns `Ok(false)` for a duplicate delivery of the current status.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` when the callback would
    /// move a terminal status to a different one, or back to `created`.
    pub fn apply_gateway_status(
        &mut self,
        status: PaymentStatus,
        external_payment_id: Option<&str>,
    ) -> Result<bool, DomainError> {
        if self.status == status {
            return Ok(false);
        }
        if self.status.is_terminal() || status == PaymentStatus::Created {
            return Err(DomainError::InvalidStateTransition(format!(
                "payment {} cannot move from {} to {}",
                self.external_order_id, self.status, status
            )));
        }

        self.status = status;
        if let Some(id) = external_payment_id {
            self.external_payment_id = Some(id.to_string());
        }
        self.updated_at = Utc::now();
        Ok(true)
    }

    /// Link the match committed for this payment.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` if the payment is not
    /// settled or is already linked to a different match.
    pub fn link_match(&mut self, match_id: MatchId) -> Result<(), DomainError> {
        if !self.is_settled() {
            return Err(DomainError::InvalidStateTransition(format!(
                "payment {} is {}, only completed payments can be linked",
                self.external_order_id, self.status
            )));
        }
        match self.linked_match_id {
            Some(existing) if existing != match_id => Err(DomainError::InvalidStateTransition(
                format!("payment {} already linked to match {}", self.external_order_id, existing),
            )),
            _ => {
                self.linked_match_id = Some(match_id);
                self.updated_at = Utc::now();
                Ok(())
            },
        }
    }

    /// Flag for manual reconciliation (refund or reassignment).
    pub fn flag_for_reconciliation(&mut self, flag: ReconciliationFlag) {
        self.reconciliation = Some(flag);
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Match
// =============================================================================

/// A committed booking, created only through the commit coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Match identifier
    pub id: MatchId,
    /// Venue played at
    pub venue_id: VenueId,
    /// Day played
    pub date: NaiveDate,
    /// Booked hours
    pub span: HourSpan,
    /// Match format
    pub format: MatchFormat,
    /// The completed payment this match was paid with
    pub payment_id: PaymentId,
    /// Lifecycle status
    pub status: MatchStatus,
    /// Commit time
    pub created_at: DateTime<Utc>,
    /// Set on cancellation
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Reason given on cancellation
    pub cancellation_reason: Option<String>,
}

impl Match {
    /// Draft a scheduled match for a request and its settled payment
    pub fn scheduled(request: &BookingRequest, span: HourSpan, payment_id: PaymentId) -> Self {
        Self {
            id: Uuid::now_v7(),
            venue_id: request.venue_id,
            date: request.date,
            span,
            format: request.format,
            payment_id,
            status: MatchStatus::Scheduled,
            created_at: Utc::now(),
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    /// The interval this match occupies
    pub fn interval(&self) -> BookingInterval {
        BookingInterval {
            venue_id: self.venue_id,
            date: self.date,
            span: self.span,
            match_id: self.id,
            status: self.status,
        }
    }

    /// Cancel the match, freeing its slot.
    ///
    /// # Errors
    /// Only scheduled matches can be cancelled.
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        if self.status != MatchStatus::Scheduled {
            return Err(DomainError::InvalidStateTransition(format!(
                "match {} is {}, only scheduled matches can be cancelled",
                self.id, self.status
            )));
        }
        self.status = MatchStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        self.cancellation_reason = Some(reason.unwrap_or_else(|| "No reason provided".to_string()));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
