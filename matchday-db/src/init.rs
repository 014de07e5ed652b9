//! Demo data initialization for Matchday.
//!
//! Seeds one active venue so a fresh database can take bookings.

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::Result;

/// Name of the seeded venue.
pub const DEMO_VENUE_NAME: &str = "Demo Turf";

/// Create the demo venue if no venue with that name exists.
///
/// Returns the id of the existing or newly created venue.
pub async fn seed_demo_venue(pool: &PgPool, hourly_rate: Decimal) -> Result<Uuid> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query("SELECT id FROM venues WHERE name = $1 LIMIT 1")
        .bind(DEMO_VENUE_NAME)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some(row) = existing {
        let id: Uuid = row.get("id");
        info!("Venue already exists: id={}, name={}", id, DEMO_VENUE_NAME);
        tx.commit().await?;
        return Ok(id);
    }

    let id = Uuid::now_v7();
    info!("Creating demo venue: id={}, rate={}", id, hourly_rate);

    sqlx::query(
        r#"
        INSERT INTO venues (id, name, hourly_rate, capacity, active)
        VALUES ($1, $2, $3, 22, TRUE)
        "#,
    )
    .bind(id)
    .bind(DEMO_VENUE_NAME)
    .bind(hourly_rate)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}
