//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Booking Coordinator (availability, payment, commit)
//! - API Server (HTTP endpoints and webhook intake)
//! - Reconciler (commits settlements nobody waited for)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Build rules, coordinator, and metrics
//! 3. Start API server
//! 4. Start reconciler loop
//! 5. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use matchday_domain::{Amount, StandardDurations, Venue, VenueId};
use matchday_engine::BookingRules;
use matchday_exec::{BookingCoordinator, PaymentGatewayPort, Reconciler, StubGateway};
use matchday_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::metrics::Metrics;

/// Name of the venue seeded into in-memory development runs
pub const DEMO_VENUE_NAME: &str = "Demo Turf";

// =============================================================================
// Daemon
// =============================================================================

/// The main Matchday daemon.
pub struct Daemon<S: Store + 'static, G: PaymentGatewayPort + 'static> {
    /// Configuration
    config: Config,
    /// Booking coordinator
    coordinator: Arc<BookingCoordinator<S, G>>,
    /// Metrics registry
    metrics: Arc<Metrics>,
    /// Cancelled to stop every task
    shutdown: CancellationToken,
}

impl Daemon<MemoryStore, StubGateway> {
    /// Create a new daemon with stub components (for testing/development).
    pub fn new_stub(config: Config) -> DaemonResult<Self> {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(StubGateway::new()))
    }
}

impl<S: Store + 'static, G: PaymentGatewayPort + 'static> Daemon<S, G> {
    /// Create a new daemon with provided components.
    pub fn new(config: Config, store: Arc<S>, gateway: Arc<G>) -> DaemonResult<Self> {
        let rules = BookingRules::new(
            config.booking.operating_window()?,
            Arc::new(StandardDurations),
        );
        let coordinator = Arc::new(BookingCoordinator::new(
            store,
            gateway,
            rules,
            config.booking.poll_policy(),
        ));

        Ok(Self {
            config,
            coordinator,
            metrics: Arc::new(Metrics::new()?),
            shutdown: CancellationToken::new(),
        })
    }

    /// Booking coordinator
    pub fn coordinator(&self) -> &Arc<BookingCoordinator<S, G>> {
        &self.coordinator
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Router over this daemon's state, without binding a socket.
    pub fn router(&self) -> axum::Router {
        create_router(self.api_state())
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT or the
    /// shutdown token).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            window = %self.coordinator.rules().window(),
            "Starting Matchday daemon"
        );

        // 1. Start API server
        let (api_addr, server) = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 2. Start reconciler
        let reconciler = self.start_reconciler();

        // 3. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 4. Graceful shutdown
        self.shutdown.cancel();
        for (name, task) in [("api", server), ("reconciler", reconciler)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Task ended abnormally");
            }
        }

        info!("Matchday daemon stopped");
        Ok(())
    }

    fn api_state(&self) -> Arc<ApiState<S, G>> {
        Arc::new(ApiState {
            coordinator: self.coordinator.clone(),
            metrics: self.metrics.clone(),
            webhook_secret: self.config.gateway.webhook_secret.clone(),
            currency: self.config.booking.currency.clone(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let router = self.router();
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, handle))
    }

    /// Start the reconciler loop.
    fn start_reconciler(&self) -> JoinHandle<()> {
        let reconciler =
            Reconciler::new(self.coordinator.clone(), self.config.booking.reconcile_interval);
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            reconciler.run(shutdown, move |report| metrics.record_sweep(report)).await;
        })
    }
}

/// Save a demo venue so an in-memory run has something to book.
pub async fn seed_demo_venue<S: Store>(store: &S, hourly_rate: Decimal) -> DaemonResult<VenueId> {
    let venue = Venue::new(DEMO_VENUE_NAME, Amount::new(hourly_rate)?, 22);
    store.venues().save(&venue).await?;
    info!(venue_id = %venue.id, name = DEMO_VENUE_NAME, "Demo venue seeded");
    Ok(venue.id)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test]
    async fn test_daemon_stops_on_shutdown_token() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();
        let shutdown = daemon.shutdown_token();

        let handle = tokio::spawn(daemon.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_at_build() {
        let mut config = Config::test();
        config.booking.opening_hour = 20;
        config.booking.closing_hour = 8;

        assert!(matches!(Daemon::new_stub(config), Err(DaemonError::Config(_))));
    }

    #[tokio::test]
    async fn test_seed_demo_venue() {
        let daemon = Daemon::new_stub(Config::test()).unwrap();
        let store = daemon.coordinator().store();

        let venue_id = seed_demo_venue(store.as_ref(), dec!(1200)).await.unwrap();
        let venue = store.venues().find_by_id(venue_id).await.unwrap().unwrap();
        assert_eq!(venue.name, DEMO_VENUE_NAME);
        assert!(venue.active);
    }
}
