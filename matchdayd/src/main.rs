//! Matchday Daemon
//!
//! Booking API, gateway webhook intake, and settlement reconciler.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store, stub gateway)
//! cargo run -p matchdayd
//!
//! # Start against PostgreSQL
//! DATABASE_URL=postgres://... cargo run -p matchdayd --features postgres
//!
//! # Database maintenance
//! cargo run -p matchdayd --features postgres -- db migrate
//! ```
//!
//! # Environment Variables
//!
//! - `MATCHDAY_ENV`: Environment (test, development, production)
//! - `MATCHDAY_API_HOST`: API host (default: 0.0.0.0)
//! - `MATCHDAY_API_PORT`: API port (default: 8080)
//! - `MATCHDAY_OPENING_HOUR` / `MATCHDAY_CLOSING_HOUR`: Operating window (default: 6-22)
//! - `MATCHDAY_POLL_ATTEMPTS`: Settlement reads per confirm (default: 5)
//! - `MATCHDAY_POLL_INTERVAL_MS`: Pause between reads (default: 2000)
//! - `MATCHDAY_RECONCILE_INTERVAL_SECS`: Reconciler period (default: 30)
//! - `MATCHDAY_CURRENCY`: Default currency (default: INR)
//! - `MATCHDAY_WEBHOOK_SECRET`: Webhook HMAC secret (required in production)
//! - `MATCHDAY_GATEWAY_URL`, `MATCHDAY_GATEWAY_KEY_ID`, `MATCHDAY_GATEWAY_KEY_SECRET`:
//!   Hosted gateway; the stub gateway is used when unset
//! - `DATABASE_URL`: PostgreSQL (postgres feature)

use std::sync::Arc;

use matchday_connectors::GatewayRestClient;
use matchday_exec::StubGateway;
use matchday_store::{MemoryStore, Store};
use matchdayd::{seed_demo_venue, Config, Daemon, Environment};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("matchdayd=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        return run_db(args).await;
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Matchday Daemon"
    );

    launch_with_store(config).await
}

#[cfg(feature = "postgres")]
async fn run_db(args: Vec<String>) -> anyhow::Result<()> {
    matchdayd::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: Vec<String>) -> anyhow::Result<()> {
    anyhow::bail!("db commands require the postgres feature")
}

#[cfg(feature = "postgres")]
async fn launch_with_store(config: Config) -> anyhow::Result<()> {
    if let Some(url) = config.database_url.clone() {
        let pool = sqlx::PgPool::connect(&url).await?;
        info!("Connected to PostgreSQL");
        let store = Arc::new(matchday_store::PgStore::new(Arc::new(pool)));
        return launch(config, store).await;
    }
    launch(config, memory_store().await?).await
}

#[cfg(not(feature = "postgres"))]
async fn launch_with_store(config: Config) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is off; using the in-memory store");
    }
    launch(config, memory_store().await?).await
}

async fn memory_store() -> anyhow::Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());
    seed_demo_venue(store.as_ref(), Decimal::from(1200)).await?;
    Ok(store)
}

async fn launch<S: Store + 'static>(config: Config, store: Arc<S>) -> anyhow::Result<()> {
    match config.gateway.credentials() {
        Some((key_id, key_secret)) => {
            let gateway = match config.gateway.api_url.clone() {
                Some(url) => GatewayRestClient::with_base_url(url, key_id, key_secret),
                None => GatewayRestClient::new(key_id, key_secret),
            };
            info!(base_url = gateway.base_url(), "Using hosted payment gateway");
            Daemon::new(config, store, Arc::new(gateway))?.run().await?;
        },
        None => {
            if config.environment != Environment::Test {
                warn!("No gateway credentials, using stub gateway");
            }
            Daemon::new(config, store, Arc::new(StubGateway::new()))?.run().await?;
        },
    }
    Ok(())
}
