//! Payment Gateway REST Client
//!
//! Creates orders at a hosted gateway exposing the common orders API:
//!
//! - `POST /v1/orders` with `{amount, currency, receipt}`, amount in minor units
//! - HTTP basic auth with the key id and key secret
//!
//! Settlement is not observed here. The gateway reports it through the
//! webhook, which the daemon verifies with [`crate::signature`].

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use matchday_domain::{Amount, PaymentIntent};
use matchday_exec::{ExecError, PaymentGatewayPort};

// =============================================================================
// Constants
// =============================================================================

/// Default gateway API base URL
pub const DEFAULT_API_URL: &str = "https://api.razorpay.com";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Minor units per major unit (paise per rupee, cents per dollar)
const MINOR_UNITS: i64 = 100;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the gateway REST client.
#[derive(Debug, Clone, Error)]
pub enum GatewayRestError {
    /// Failed to compute a signature
    #[error("Failed to build signature: {0}")]
    SignatureError(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned an error body
    #[error("Gateway API error: {code} - {description}")]
    ApiError { code: String, description: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<GatewayRestError> for ExecError {
    fn from(err: GatewayRestError) -> Self {
        ExecError::Gateway(err.to_string())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    #[serde(default)]
    description: String,
}

// =============================================================================
// Gateway REST Client
// =============================================================================

/// REST client for the hosted payment gateway.
pub struct GatewayRestClient {
    /// HTTP client
    client: Client,
    /// API base URL
    base_url: String,
    /// Key id (basic auth user)
    key_id: String,
    /// Key secret (basic auth password)
    key_secret: String,
}

impl GatewayRestClient {
    /// Create a client against the default API URL.
    pub fn new(key_id: String, key_secret: String) -> Self {
        Self::with_base_url(DEFAULT_API_URL.to_string(), key_id, key_secret)
    }

    /// Create a client against a custom API URL (sandbox, proxy).
    pub fn with_base_url(base_url: String, key_id: String, key_secret: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        }
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an order and return the raw gateway response.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<OrderResponse, GatewayRestError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = CreateOrderBody { amount: amount_minor, currency, receipt };

        let response = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client
                .post(&url)
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| GatewayRestError::Timeout)?
        .map_err(|e| GatewayRestError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayRestError::ParseError(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| GatewayRestError::ParseError(e.to_string()))
    }

    /// List a single order to prove credentials and reachability.
    async fn ping(&self) -> Result<(), GatewayRestError> {
        let url = format!("{}/v1/orders?count=1", self.base_url);

        let response = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.get(&url).basic_auth(&self.key_id, Some(&self.key_secret)).send(),
        )
        .await
        .map_err(|_| GatewayRestError::Timeout)?
        .map_err(|e| GatewayRestError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGatewayPort for GatewayRestClient {
    async fn create_intent(
        &self,
        amount: Amount,
        currency: &str,
        receipt_id: &str,
    ) -> Result<PaymentIntent, ExecError> {
        let amount_minor = to_minor_units(amount.as_decimal())?;
        debug!(amount_minor, currency, receipt_id, "Creating gateway order");

        let order = self.create_order(amount_minor, currency, receipt_id).await?;

        if order.amount != amount_minor {
            return Err(GatewayRestError::ParseError(format!(
                "order {} amount {} does not match requested {}",
                order.id, order.amount, amount_minor
            ))
            .into());
        }

        info!(order_id = %order.id, %amount, currency = %order.currency, "Gateway order created");

        Ok(PaymentIntent {
            intent_id: order.id,
            amount,
            currency: order.currency,
            receipt_id: order.receipt.unwrap_or_else(|| receipt_id.to_string()),
            created_at: order.created_at.and_then(from_unix).unwrap_or_else(Utc::now),
        })
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        self.ping().await.map_err(Into::into)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Convert a major-unit amount to integral minor units.
///
/// Rejects amounts with more precision than one minor unit.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayRestError> {
    let minor = amount * Decimal::from(MINOR_UNITS);
    if minor.fract() != Decimal::ZERO {
        return Err(GatewayRestError::InvalidParameter(format!(
            "amount {} has sub-minor-unit precision",
            amount
        )));
    }
    minor
        .to_i64()
        .ok_or_else(|| GatewayRestError::InvalidParameter(format!("amount {} out of range", amount)))
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn api_error(status: u16, body: &str) -> GatewayRestError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => GatewayRestError::ApiError {
            code: envelope.error.code,
            description: envelope.error.description,
        },
        Err(_) => GatewayRestError::RequestFailed(format!("HTTP {}: {}", status, body)),
    }
}

// =============================================================================
// Tests
// =============================================================================
