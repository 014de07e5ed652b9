//! Database lifecycle management for Matchday.
//!
//! Provides migration running, status checking, and demo venue seeding.

mod init;

pub use init::seed_demo_venue;

use sqlx::{PgPool, Row};
use tracing::{info, warn};

/// Result type for DB operations.
pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// Run all pending migrations.
///
/// Uses sqlx migrations from the workspace `migrations` directory.
/// Idempotent: safe to run multiple times.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("../migrations").run(pool).await?;

    info!("Migrations completed successfully");
    Ok(())
}

/// Check database connectivity and migration status.
///
/// Logs the latest applied migrations and booking table counts.
pub async fn status(pool: &PgPool) -> Result<()> {
    let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;

    if result != 1 {
        return Err(anyhow::anyhow!("Database connectivity check failed"));
    }

    info!("Database connectivity: OK");

    // Runtime query (sqlx::query! requires DB at compile time)
    let rows = sqlx::query(
        r#"
        SELECT version, description, installed_on::text AS installed_at, success
        FROM _sqlx_migrations
        ORDER BY version DESC
        LIMIT 10
        "#,
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(migs) if !migs.is_empty() => {
            info!("Latest migrations:");
            for mig in migs {
                let version: i64 = mig.get("version");
                let description: String = mig.get("description");
                let installed_at: Option<String> = mig.get("installed_at");
                let success: Option<bool> = mig.get("success");

                let status = if success.unwrap_or(true) { "✓" } else { "✗" };
                info!(
                    "  {} v{}: {} ({})",
                    status,
                    version,
                    description,
                    installed_at.unwrap_or_else(|| "N/A".to_string())
                );
            }
        },
        Ok(_) => {
            warn!("No migrations found in database (run `matchdayd db migrate` first)");
            return Ok(());
        },
        Err(e) => {
            // Table might not exist yet
            if e.to_string().contains("_sqlx_migrations") {
                warn!("Migration table not found (run `matchdayd db migrate` first)");
                return Ok(());
            }
            return Err(e.into());
        },
    }

    let counts = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM venues) AS venues,
            (SELECT COUNT(*) FROM matches WHERE status IN ('scheduled', 'ongoing')) AS occupying,
            (SELECT COUNT(*) FROM payments WHERE status = 'completed'
                AND linked_match_id IS NULL AND reconciliation IS NULL) AS awaiting_commit,
            (SELECT COUNT(*) FROM payments WHERE reconciliation IS NOT NULL) AS flagged
        "#,
    )
    .fetch_one(pool)
    .await?;

    let flagged: i64 = counts.get("flagged");
    info!(
        venues = counts.get::<i64, _>("venues"),
        occupying = counts.get::<i64, _>("occupying"),
        awaiting_commit = counts.get::<i64, _>("awaiting_commit"),
        flagged,
        "Booking tables"
    );
    if flagged > 0 {
        warn!(flagged, "Payments need manual reconciliation (refund or reassignment)");
    }

    Ok(())
}
