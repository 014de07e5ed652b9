//! Matchday Execution Layer
//!
//! Pay-first booking flow: payment intent, settlement polling, and the
//! authoritative commit.
//!
//! # Architecture
//!
//! ```text
//! Request → Advisory check → Gateway intent → Poller → Commit (locked re-check) → Match
//! ```
//!
//! # Components
//!
//! - **Ports**: Trait for the external payment gateway
//! - **Poller**: Bounded settlement polling with cancellation
//! - **Coordinator**: Availability, validation, payment and commit
//! - **Session**: One caller's selection and commit progress
//! - **Reconciler**: Commits payments that settled after the caller stopped waiting
//! - **Stub**: Test gateway
//!
//! # Example
//!
//! ```rust,ignore
//! use matchday_exec::{BookingCoordinator, StubGateway};
//! use matchday_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let gateway = Arc::new(StubGateway::new());
//! let coordinator = BookingCoordinator::new(store, gateway, BookingRules::default(), PollPolicy::default());
//!
//! let intent = coordinator.initiate_payment(&request, amount, "INR", "rcpt_1").await?;
//! let outcome = coordinator.initiate_and_commit(&intent.intent_id, &CancellationToken::new()).await?;
//! ```

#![warn(clippy::all)]

pub mod coordinator;
pub mod error;
pub mod poller;
pub mod ports;
pub mod reconciler;
pub mod session;
pub mod stub;

// Re-exports for convenience
pub use coordinator::{BookingCoordinator, BookingOutcome};
pub use error::{ErrorCode, ExecError, ExecResult};
pub use poller::{PaymentPoller, PollOutcome, PollPolicy};
pub use ports::PaymentGatewayPort;
pub use reconciler::{ReconcileReport, Reconciler};
pub use session::{BookingSession, CommitPhase, Selection};
pub use stub::StubGateway;

pub use tokio_util::sync::CancellationToken;
