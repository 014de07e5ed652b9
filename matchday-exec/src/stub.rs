//! Stub implementations for testing.
//!
//! Simulates the payment gateway without making real API calls.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use matchday_domain::{Amount, PaymentIntent};

use crate::error::ExecError;
use crate::ports::PaymentGatewayPort;

// =============================================================================
// Stub Gateway
// =============================================================================

/// Stub payment gateway for testing.
///
/// Hands out sequential order ids. Settlement is simulated by applying
/// callbacks to the store directly.
pub struct StubGateway {
    /// Order counter for generating IDs
    order_counter: AtomicU64,
    /// Whether to simulate a failure on the next call
    fail_next: AtomicBool,
}

impl StubGateway {
    /// Create a new stub gateway.
    pub fn new() -> Self {
        Self {
            order_counter: AtomicU64::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Configure the next call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Number of intents created so far.
    pub fn intents_created(&self) -> u64 {
        self.order_counter.load(Ordering::SeqCst)
    }

    fn next_order_id(&self) -> String {
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("order_STUB{:06}", n)
    }

    fn should_fail(&self) -> bool {
        // Reset after check
        self.fail_next.swap(false, Ordering::SeqCst)
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGatewayPort for StubGateway {
    async fn create_intent(
        &self,
        amount: Amount,
        currency: &str,
        receipt_id: &str,
    ) -> Result<PaymentIntent, ExecError> {
        if self.should_fail() {
            return Err(ExecError::Gateway("Simulated gateway failure".to_string()));
        }

        Ok(PaymentIntent {
            intent_id: self.next_order_id(),
            amount,
            currency: currency.to_string(),
            receipt_id: receipt_id.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_stub_gateway_creates_unique_orders() {
        let gateway = StubGateway::new();
        let amount = Amount::new(dec!(1200)).unwrap();

        let a = gateway.create_intent(amount, "INR", "rcpt_1").await.unwrap();
        let b = gateway.create_intent(amount, "INR", "rcpt_2").await.unwrap();

        assert_ne!(a.intent_id, b.intent_id);
        assert_eq!(a.currency, "INR");
        assert_eq!(b.receipt_id, "rcpt_2");
        assert_eq!(gateway.intents_created(), 2);
    }

    #[tokio::test]
    async fn test_stub_gateway_simulated_failure() {
        let gateway = StubGateway::new();
        gateway.set_fail_next(true);

        let amount = Amount::new(dec!(500)).unwrap();
        assert!(gateway.create_intent(amount, "INR", "r").await.is_err());
        assert!(gateway.create_intent(amount, "INR", "r").await.is_ok());
    }
}
