//! Matchday Connectors
//!
//! Adapters for the hosted payment gateway.
//!
//! # Modules
//!
//! - `gateway_rest`: REST client for creating orders (implements `PaymentGatewayPort`)
//! - `signature`: HMAC-SHA256 signing and verification of webhook bodies

pub mod gateway_rest;
pub mod signature;

pub use gateway_rest::{GatewayRestClient, GatewayRestError};
pub use signature::{sign_payload, verify_payload};
