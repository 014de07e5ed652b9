//! Matchday Daemon Library
//!
//! Runtime orchestrator for the Matchday booking engine.
//!
//! # Architecture
//!
//! ```text
//! Client → API Server → Booking Coordinator → Engine (availability, conflicts)
//!                              ↓         ↑
//!                     Payment Gateway   Store ← Webhook (gateway callbacks)
//!                                        ↑
//!                                   Reconciler (late settlements)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **API**: HTTP endpoints for booking clients
//! - **Webhook**: Signed gateway callbacks, the only writer of payment status
//! - **Metrics**: Prometheus counters
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use matchdayd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
#[cfg(feature = "postgres")]
pub mod db;
pub mod error;
pub mod metrics;
pub mod webhook;

// Re-exports for convenience
pub use config::{ApiConfig, BookingConfig, Config, Environment, GatewayConfig};
pub use daemon::{seed_demo_venue, Daemon, DEMO_VENUE_NAME};
pub use error::{DaemonError, DaemonResult};
pub use metrics::Metrics;
pub use webhook::{GatewayEvent, WebhookAck, SIGNATURE_HEADER};
