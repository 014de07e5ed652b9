//! Database CLI subcommands for matchdayd.
//!
//! Provides `db migrate`, `db status`, and `db init` commands.

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::env;
use tracing::info;

use matchday_db::{migrate, seed_demo_venue, status};

/// Hourly rate for the seeded demo venue when `--rate` is absent
const DEFAULT_DEMO_RATE: i64 = 1200;

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `matchdayd db migrate` - Run pending migrations
/// - `matchdayd db status` - Check migration status and booking health
/// - `matchdayd db init [--rate DECIMAL]` - Seed a demo venue
pub async fn run_db_command(args: Vec<String>) -> Result<()> {
    if args.len() < 3 {
        return Err(anyhow!("Usage: matchdayd db <migrate|status|init> [options]"));
    }

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match args[2].as_str() {
        "migrate" => {
            migrate(&pool).await?;
        },
        "status" => {
            status(&pool).await?;
        },
        "init" => {
            let rate = parse_init_args(&args[3..])?;
            let venue_id = seed_demo_venue(&pool, rate).await?;
            info!("Initialized: venue_id={}", venue_id);
        },
        _ => {
            return Err(anyhow!("Unknown db command: {}. Use migrate, status, or init", args[2]));
        },
    }

    Ok(())
}

fn parse_init_args(args: &[String]) -> Result<Decimal> {
    let mut rate = Decimal::from(DEFAULT_DEMO_RATE);

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--rate" => {
                let value = args.get(i + 1).ok_or_else(|| anyhow!("--rate requires a value"))?;
                rate = value.parse()?;
                i += 2;
            },
            other => {
                return Err(anyhow!("Unknown option: {}", other));
            },
        }
    }

    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_init_args() {
        assert_eq!(parse_init_args(&[]).unwrap(), Decimal::from(1200));
        assert_eq!(parse_init_args(&args(&["--rate", "950.50"])).unwrap(), Decimal::new(95050, 2));
        assert!(parse_init_args(&args(&["--rate"])).is_err());
        assert!(parse_init_args(&args(&["--venue", "x"])).is_err());
    }
}
