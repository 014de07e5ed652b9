//! Matchday Storage Layer
//!
//! Provides persistence for venues, matches, and payment records.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **In-memory store**: Fast implementation for testing
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! Committing a match is the one operation that must be serialised: it runs
//! under a lock scoped to `(venue_id, date)` in both implementations.
//!
//! # Usage
//!
//! ```rust
//! use matchday_store::{MemoryStore, Store};
//! use matchday_domain::{Amount, Venue};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let venue = Venue::new("Riverside Turf", Amount::new(Decimal::from(1200)).unwrap(), 22);
//!     store.venues().save(&venue).await.unwrap();
//!
//!     let found = store.venues().find_by_id(venue.id).await.unwrap();
//!     assert!(found.is_some());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{
    BookingRepository, CommitOutcome, ConflictCheck, MatchRepository, PaymentRepository, Store,
    VenueRepository,
};
