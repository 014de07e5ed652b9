//! Gateway webhook intake.
//!
//! The gateway is the only writer of payment status. Each delivery is
//! authenticated against the shared secret, parsed, and applied to the
//! PaymentRecord. A settled payment is committed right away; if that fails
//! the reconciler picks it up on its next sweep.
//!
//! Deliveries are at-least-once and unordered, so every step is idempotent:
//! a repeated status is a no-op and `commit_settled` returns the same outcome.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use matchday_connectors::verify_payload;
use matchday_domain::PaymentStatus;
use matchday_exec::{BookingCoordinator, BookingOutcome, PaymentGatewayPort};
use matchday_store::{Store, StoreError};

use crate::error::{DaemonError, DaemonResult};

/// Header carrying the hex HMAC-SHA256 of the raw body
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    payment: Option<Wrapped>,
}

#[derive(Debug, Deserialize)]
struct Wrapped {
    entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// A parsed gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Payment captured; the order is settled
    Captured {
        /// Gateway order id
        order_id: String,
        /// Gateway payment id
        payment_id: String,
    },
    /// Payment failed
    Failed {
        /// Gateway order id
        order_id: String,
        /// Gateway payment id
        payment_id: String,
        /// Gateway's failure description
        reason: Option<String>,
    },
    /// Event type this daemon does not act on
    Ignored(String),
}

impl GatewayEvent {
    /// Event name for logs and metrics.
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Captured { .. } => "payment.captured",
            GatewayEvent::Failed { .. } => "payment.failed",
            GatewayEvent::Ignored(name) => name,
        }
    }
}

/// Result of applying one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Status applied
    Processed,
    /// Acknowledged without effect (unknown event, unknown order, stale transition)
    Ignored,
}

/// Response body for a webhook delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    /// What happened to the delivery
    pub status: AckStatus,
    /// Event name
    pub event: String,
    /// Order the event referred to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Commit outcome for captured payments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BookingOutcome>,
}

// =============================================================================
// Authentication and parsing
// =============================================================================

/// Verify the signature header when a secret is configured.
///
/// # Errors
/// `BadRequest` if the header is missing, `Webhook` if it does not match.
pub fn authenticate(secret: Option<&str>, headers: &HeaderMap, body: &[u8]) -> DaemonResult<()> {
    let Some(secret) = secret else {
        debug!("No webhook secret configured, skipping signature check");
        return Ok(());
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DaemonError::BadRequest(format!("missing {} header", SIGNATURE_HEADER)))?;

    if !verify_payload(secret, body, signature) {
        warn!(body_len = body.len(), "Webhook signature mismatch");
        return Err(DaemonError::Webhook("invalid signature".to_string()));
    }
    Ok(())
}

/// Parse a delivery body.
///
/// # Errors
/// `BadRequest` for invalid JSON, or a payment event without a payment
/// entity or order id.
pub fn parse_event(body: &[u8]) -> DaemonResult<GatewayEvent> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| DaemonError::BadRequest(format!("invalid webhook JSON: {}", e)))?;

    let captured = match envelope.event.as_str() {
        "payment.captured" => true,
        "payment.failed" => false,
        _ => return Ok(GatewayEvent::Ignored(envelope.event)),
    };

    let entity = envelope
        .payload
        .and_then(|p| p.payment)
        .map(|w| w.entity)
        .ok_or_else(|| {
            DaemonError::BadRequest(format!("{} without payment entity", envelope.event))
        })?;
    let order_id = entity
        .order_id
        .ok_or_else(|| DaemonError::BadRequest(format!("payment {} has no order_id", entity.id)))?;

    Ok(if captured {
        GatewayEvent::Captured { order_id, payment_id: entity.id }
    } else {
        GatewayEvent::Failed { order_id, payment_id: entity.id, reason: entity.error_description }
    })
}

// =============================================================================
// Application
// =============================================================================

/// Apply a parsed event to the store, committing captured payments.
///
/// # Errors
/// Only store failures that a redelivery could fix; everything else is
/// acknowledged so the gateway stops retrying.
pub async fn apply_event<S, G>(
    coordinator: &BookingCoordinator<S, G>,
    event: GatewayEvent,
) -> DaemonResult<WebhookAck>
where
    S: Store,
    G: PaymentGatewayPort,
{
    let name = event.name().to_string();
    let (order_id, payment_id, status) = match event {
        GatewayEvent::Captured { order_id, payment_id } => {
            (order_id, payment_id, PaymentStatus::Completed)
        },
        GatewayEvent::Failed { order_id, payment_id, reason } => {
            warn!(%order_id, %payment_id, reason = reason.as_deref().unwrap_or("unknown"), "Gateway reported payment failure");
            (order_id, payment_id, PaymentStatus::Failed)
        },
        GatewayEvent::Ignored(_) => {
            debug!(event = %name, "Unhandled webhook event acknowledged");
            return Ok(ack(AckStatus::Ignored, name, None, None));
        },
    };

    let record = match coordinator
        .store()
        .payments()
        .apply_gateway_status(&order_id, status, Some(&payment_id))
        .await
    {
        Ok(record) => record,
        Err(StoreError::NotFound { .. }) => {
            warn!(%order_id, event = %name, "Webhook for unknown order ignored");
            return Ok(ack(AckStatus::Ignored, name, Some(order_id), None));
        },
        Err(StoreError::Domain(e)) => {
            warn!(%order_id, event = %name, error = %e, "Stale webhook ignored");
            return Ok(ack(AckStatus::Ignored, name, Some(order_id), None));
        },
        Err(e) => return Err(e.into()),
    };

    info!(%order_id, %payment_id, status = %record.status, "Payment status applied");

    let outcome = if record.is_settled() {
        match coordinator.commit_settled(&record).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(%order_id, error = %e, "Commit after webhook failed, reconciler will retry");
                None
            },
        }
    } else {
        None
    };

    Ok(ack(AckStatus::Processed, name, Some(order_id), outcome))
}

fn ack(
    status: AckStatus,
    event: String,
    order_id: Option<String>,
    outcome: Option<BookingOutcome>,
) -> WebhookAck {
    WebhookAck { status, event, order_id, outcome }
}

// =============================================================================
// Tests
// =============================================================================
