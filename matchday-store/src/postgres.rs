//! PostgreSQL store.
//!
//! Commits take a transaction-scoped advisory lock on `(venue_id, date)`
//! and lock the existing match rows before the authoritative check. The
//! `matches_no_overlap` exclusion constraint backs this up; a violation
//! surfaces as `StoreError::SlotTaken` and leaves the payment unlinked for
//! the reconciler to retry.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{
    conflict_flag, BookingRepository, CommitOutcome, ConflictCheck, MatchRepository,
    PaymentRepository, Store, VenueRepository,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use matchday_domain::{
    Amount, BookingInterval, BookingRequest, HourSpan, Match, MatchId, PaymentRecord,
    PaymentStatus, ReconciliationFlag, Venue, VenueId,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

const PAYMENT_COLUMNS: &str = "id, external_order_id, external_payment_id, status, \
     linked_match_id, venue_id, match_date, start_hour, format, amount, currency, \
     reconciliation, created_at, updated_at";

const MATCH_COLUMNS: &str = "id, venue_id, match_date, start_hour, end_hour, format, \
     payment_id, status, created_at, cancelled_at, cancellation_reason";

/// PostgreSQL implementation of every repository.
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_payment(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE external_order_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.as_ref().map(parse_payment_row).transpose()
    }

    async fn save_payment_state(
        tx: &mut Transaction<'_, Postgres>,
        record: &PaymentRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                external_payment_id = $3,
                linked_match_id = $4,
                reconciliation = $5,
                updated_at = $6
            WHERE external_order_id = $1
            "#,
        )
        .bind(&record.external_order_id)
        .bind(record.status.as_str())
        .bind(record.external_payment_id.as_deref())
        .bind(record.linked_match_id)
        .bind(record.reconciliation.as_ref().map(Json))
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Row parsing
// =============================================================================

fn hour(row: &PgRow, column: &str) -> Result<u8, StoreError> {
    let value: i32 = row.try_get(column)?;
    u8::try_from(value)
        .map_err(|_| StoreError::Deserialization(format!("{} out of range: {}", column, value)))
}

fn parse_venue_row(row: &PgRow) -> Result<Venue, StoreError> {
    let capacity: i32 = row.try_get("capacity")?;
    Ok(Venue {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        hourly_rate: Amount::new(row.try_get("hourly_rate")?)?,
        capacity: u32::try_from(capacity)
            .map_err(|_| StoreError::Deserialization(format!("negative capacity {}", capacity)))?,
        active: row.try_get("active")?,
    })
}

fn parse_match_row(row: &PgRow) -> Result<Match, StoreError> {
    let format: String = row.try_get("format")?;
    let status: String = row.try_get("status")?;
    Ok(Match {
        id: row.try_get("id")?,
        venue_id: row.try_get("venue_id")?,
        date: row.try_get("match_date")?,
        span: HourSpan::new(hour(row, "start_hour")?, hour(row, "end_hour")?)?,
        format: format.parse()?,
        payment_id: row.try_get("payment_id")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
    })
}

fn parse_payment_row(row: &PgRow) -> Result<PaymentRecord, StoreError> {
    let format: String = row.try_get("format")?;
    let status: String = row.try_get("status")?;
    let reconciliation: Option<Json<ReconciliationFlag>> = row.try_get("reconciliation")?;
    Ok(PaymentRecord {
        id: row.try_get("id")?,
        external_order_id: row.try_get("external_order_id")?,
        external_payment_id: row.try_get("external_payment_id")?,
        status: status.parse()?,
        linked_match_id: row.try_get("linked_match_id")?,
        booking: BookingRequest {
            venue_id: row.try_get("venue_id")?,
            date: row.try_get("match_date")?,
            start_hour: hour(row, "start_hour")?,
            format: format.parse()?,
        },
        amount: Amount::new(row.try_get("amount")?)?,
        currency: row.try_get("currency")?,
        reconciliation: reconciliation.map(|Json(flag)| flag),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// =============================================================================
// Venue Repository Implementation
// =============================================================================

#[async_trait]
impl VenueRepository for PgStore {
    async fn save(&self, venue: &Venue) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO venues (id, name, hourly_rate, capacity, active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                hourly_rate = EXCLUDED.hourly_rate,
                capacity = EXCLUDED.capacity,
                active = EXCLUDED.active
            "#,
        )
        .bind(venue.id)
        .bind(&venue.name)
        .bind(venue.hourly_rate.as_decimal())
        .bind(i32::try_from(venue.capacity).unwrap_or(i32::MAX))
        .bind(venue.active)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: VenueId) -> Result<Option<Venue>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, hourly_rate, capacity, active FROM venues WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(parse_venue_row).transpose()
    }
}

// =============================================================================
// Booking Repository Implementation
// =============================================================================

#[async_trait]
impl BookingRepository for PgStore {
    async fn find_occupying(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<BookingInterval>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches \
             WHERE venue_id = $1 AND match_date = $2 AND status IN ('scheduled', 'ongoing') \
             ORDER BY start_hour",
            MATCH_COLUMNS
        ))
        .bind(venue_id)
        .bind(date)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(|row| parse_match_row(row).map(|m| m.interval())).collect()
    }
}

// =============================================================================
// Payment Repository Implementation
// =============================================================================

#[async_trait]
impl PaymentRepository for PgStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                id, external_order_id, external_payment_id, status, linked_match_id,
                venue_id, match_date, start_hour, format, amount, currency,
                reconciliation, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id)
        .bind(&record.external_order_id)
        .bind(record.external_payment_id.as_deref())
        .bind(record.status.as_str())
        .bind(record.linked_match_id)
        .bind(record.booking.venue_id)
        .bind(record.booking.date)
        .bind(i32::from(record.booking.start_hour))
        .bind(record.booking.format.as_str())
        .bind(record.amount.as_decimal())
        .bind(&record.currency)
        .bind(record.reconciliation.as_ref().map(Json))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match StoreError::from(err) {
                StoreError::Duplicate { .. } => {
                    Err(StoreError::duplicate("payment", &record.external_order_id))
                },
                other => Err(other),
            },
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE external_order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.as_ref().map(parse_payment_row).transpose()
    }

    async fn apply_gateway_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        external_payment_id: Option<&str>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut record = Self::lock_payment(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        if record.apply_gateway_status(status, external_payment_id)? {
            Self::save_payment_state(&mut tx, &record).await?;
        } else {
            debug!(order_id, %status, "Duplicate gateway callback ignored");
        }
        tx.commit().await?;
        Ok(record)
    }

    async fn find_settled_unlinked(&self, limit: usize) -> Result<Vec<PaymentRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments \
             WHERE status = 'completed' AND linked_match_id IS NULL AND reconciliation IS NULL \
             ORDER BY updated_at LIMIT $1",
            PAYMENT_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(parse_payment_row).collect()
    }

    async fn flag_for_reconciliation(
        &self,
        order_id: &str,
        flag: ReconciliationFlag,
    ) -> Result<PaymentRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut record = Self::lock_payment(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        if let Some(match_id) = record.linked_match_id {
            return Err(StoreError::invalid_state(format!(
                "payment {} is linked to match {}, cannot flag",
                order_id, match_id
            )));
        }
        if record.reconciliation.is_none() {
            record.flag_for_reconciliation(flag);
            Self::save_payment_state(&mut tx, &record).await?;
        }
        tx.commit().await?;
        Ok(record)
    }

    async fn find_flagged(&self) -> Result<Vec<PaymentRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE reconciliation IS NOT NULL ORDER BY updated_at",
            PAYMENT_COLUMNS
        ))
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(parse_payment_row).collect()
    }
}

// =============================================================================
// Match Repository Implementation
// =============================================================================

#[async_trait]
impl MatchRepository for PgStore {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM matches WHERE id = $1", MATCH_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(parse_match_row).transpose()
    }

    async fn find_by_venue_date(
        &self,
        venue_id: VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Match>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches WHERE venue_id = $1 AND match_date = $2 ORDER BY start_hour",
            MATCH_COLUMNS
        ))
        .bind(venue_id)
        .bind(date)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(parse_match_row).collect()
    }

    async fn cancel(&self, id: MatchId, reason: Option<String>) -> Result<Match, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {} FROM matches WHERE id = $1 FOR UPDATE",
            MATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("match", id.to_string()))?;

        let mut m = parse_match_row(&row)?;
        m.cancel(reason)?;

        sqlx::query(
            r#"
            UPDATE matches
            SET status = $2, cancelled_at = $3, cancellation_reason = $4
            WHERE id = $1
            "#,
        )
        .bind(m.id)
        .bind(m.status.as_str())
        .bind(m.cancelled_at)
        .bind(m.cancellation_reason.as_deref())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(m)
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for PgStore {
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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", draft.venue_id, draft.date))
            .execute(&mut *tx)
            .await?;

        let mut record = Self::lock_payment(&mut tx, order_id)
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
            let row = sqlx::query(&format!("SELECT {} FROM matches WHERE id = $1", MATCH_COLUMNS))
                .bind(match_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found("match", match_id.to_string()))?;
            return Ok(CommitOutcome::AlreadyCommitted(parse_match_row(&row)?));
        }
        if let Some(flag) = record.reconciliation.clone() {
            return Ok(CommitOutcome::Conflict(flag));
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches \
             WHERE venue_id = $1 AND match_date = $2 AND status IN ('scheduled', 'ongoing') \
             ORDER BY start_hour FOR UPDATE",
            MATCH_COLUMNS
        ))
        .bind(draft.venue_id)
        .bind(draft.date)
        .fetch_all(&mut *tx)
        .await?;
        let intervals = rows
            .iter()
            .map(|row| parse_match_row(row).map(|m| m.interval()))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(conflict) = check(&intervals) {
            let flag = conflict_flag(&conflict);
            warn!(order_id, conflicting = %conflict.span, "Commit lost slot, flagging payment");
            record.flag_for_reconciliation(flag.clone());
            Self::save_payment_state(&mut tx, &record).await?;
            tx.commit().await?;
            return Ok(CommitOutcome::Conflict(flag));
        }

        record.link_match(draft.id)?;

        sqlx::query(
            r#"
            INSERT INTO matches (
                id, venue_id, match_date, start_hour, end_hour, format,
                payment_id, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(draft.id)
        .bind(draft.venue_id)
        .bind(draft.date)
        .bind(i32::from(draft.span.start()))
        .bind(i32::from(draft.span.end()))
        .bind(draft.format.as_str())
        .bind(draft.payment_id)
        .bind(draft.status.as_str())
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await?;

        Self::save_payment_state(&mut tx, &record).await?;
        tx.commit().await?;

        debug!(order_id, match_id = %draft.id, span = %draft.span, "Match committed");
        Ok(CommitOutcome::Committed(draft))
    }
}

// =============================================================================
// Tests
// =============================================================================
