//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (payment gateway).
//! Adapters implement these ports for specific services (stub, hosted gateway).

use async_trait::async_trait;

use matchday_domain::{Amount, PaymentIntent};

use crate::error::ExecError;

// =============================================================================
// Payment Gateway Port
// =============================================================================

/// Port for creating payment orders at the external gateway.
///
/// Settlement is reported asynchronously by the gateway's webhook, which
/// writes the PaymentRecord status; this port never observes it.
///
/// Implementations:
/// - `StubGateway` - For testing (sequential order ids, optional failure)
#[async_trait]
pub trait PaymentGatewayPort: Send + Sync {
    /// Create an order for `amount` and return the intent carrying the
    /// gateway-assigned order id.
    ///
    /// # Arguments
    ///
    /// * `amount` - Amount to charge
    /// * `currency` - ISO currency code (e.g., "INR")
    /// * `receipt_id` - Caller's receipt reference
    async fn create_intent(
        &self,
        amount: Amount,
        currency: &str,
        receipt_id: &str,
    ) -> Result<PaymentIntent, ExecError>;

    /// Check if the gateway is reachable.
    async fn health_check(&self) -> Result<(), ExecError>;
}
