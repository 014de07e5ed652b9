//! HTTP API for the Matchday daemon.
//!
//! Provides REST endpoints for:
//! - Health check and metrics
//! - Venue availability
//! - Advisory booking validation
//! - Payment initiation and booking confirmation
//! - Payment status and match cancellation
//! - Gateway webhook intake

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use matchday_domain::{
    Amount, BookingInterval, BookingRequest, Match, MatchFormat, PaymentIntent, PaymentRecord,
};
use matchday_engine::Verdict;
use matchday_exec::{BookingCoordinator, BookingOutcome, ErrorCode, ExecError, PaymentGatewayPort};
use matchday_store::{Store, StoreError};

use crate::error::{DaemonError, DaemonResult};
use crate::metrics::Metrics;
use crate::webhook::{self, WebhookAck};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static, G: PaymentGatewayPort + 'static> {
    pub coordinator: Arc<BookingCoordinator<S, G>>,
    pub metrics: Arc<Metrics>,
    /// Webhook secret; unsigned deliveries are accepted when unset
    pub webhook_secret: Option<String>,
    /// Currency for payments that do not name one
    pub currency: String,
    /// Cancelled on shutdown; stops in-flight confirm polls
    pub shutdown: CancellationToken,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub gateway: String,
}

/// Availability query: `date` plus either `duration` or `format`.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub duration: Option<u8>,
    pub format: Option<MatchFormat>,
}

/// Free start hours for a venue and date.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub venue_id: Uuid,
    pub date: NaiveDate,
    pub duration_hours: u8,
    pub starts: Vec<u8>,
}

/// Request to start paying for a booking.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(flatten)]
    pub booking: BookingRequest,
    /// Amount to charge, supplied by the caller's pricing
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt_id: Option<String>,
}

/// Outcome of a confirm call, with its code and caller-facing message.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    #[serde(flatten)]
    pub outcome: BookingOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
}

/// Request to cancel a match.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    /// Interval that blocked the request, for `SLOT_CONFLICT`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<BookingInterval>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S, G>(state: Arc<ApiState<S, G>>) -> Router
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/venues/:id/availability", get(availability_handler))
        .route("/bookings/validate", post(validate_handler))
        .route("/bookings", post(create_booking_handler))
        .route("/bookings/:order_id/confirm", post(confirm_handler))
        .route("/payments/:order_id", get(payment_handler))
        .route("/matches/:id", get(get_match_handler))
        .route("/matches/:id/cancel", post(cancel_match_handler))
        .route("/webhooks/payment", post(webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler<S, G>(State(state): State<Arc<ApiState<S, G>>>) -> Json<HealthResponse>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let gateway = match state.coordinator.gateway().health_check().await {
        Ok(()) => "reachable".to_string(),
        Err(e) => {
            warn!(error = %e, "Gateway health check failed");
            "unreachable".to_string()
        },
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gateway,
    })
}

/// Prometheus metrics.
async fn metrics_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
) -> Result<impl IntoResponse, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let body = state.metrics.render().map_err(to_error_response)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

/// Free start hours for a venue on a date.
async fn availability_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Path(venue_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let duration_hours = match (query.duration, query.format) {
        (Some(hours), _) => hours,
        (None, Some(format)) => state
            .coordinator
            .rules()
            .policy()
            .checked_duration(format)
            .map_err(|e| to_error_response(e.into()))?,
        (None, None) => {
            return Err(to_error_response(DaemonError::BadRequest(
                "either duration or format is required".to_string(),
            )))
        },
    };

    let starts = state
        .coordinator
        .get_availability(venue_id, query.date, duration_hours)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    Ok(Json(AvailabilityResponse { venue_id, date: query.date, duration_hours, starts }))
}

/// Advisory validation. Never reserves the slot.
async fn validate_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<Verdict>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let verdict = state
        .coordinator
        .validate_booking(&request)
        .await
        .map_err(|e| to_error_response(e.into()))?;
    Ok(Json(verdict))
}

/// Validate and create a payment intent.
async fn create_booking_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<PaymentIntent>), ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let amount = Amount::new(req.amount).map_err(|e| to_error_response(e.into()))?;
    let currency = req.currency.unwrap_or_else(|| state.currency.clone());
    let receipt_id = req
        .receipt_id
        .unwrap_or_else(|| format!("rcpt_{}", Uuid::now_v7().simple()));

    let intent = state
        .coordinator
        .initiate_payment(&req.booking, amount, &currency, &receipt_id)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    state.metrics.record_payment_initiated();
    Ok((StatusCode::CREATED, Json(intent)))
}

/// Poll for settlement and commit.
async fn confirm_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Path(order_id): Path<String>,
) -> Result<(StatusCode, Json<ConfirmResponse>), ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    // Unknown orders fail fast instead of polling to timeout
    state
        .coordinator
        .store()
        .payments()
        .find_by_order_id(&order_id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| {
            to_error_response(DaemonError::Exec(ExecError::NotFound(format!(
                "payment {}",
                order_id
            ))))
        })?;

    let cancel = state.shutdown.child_token();
    let outcome = state
        .coordinator
        .initiate_and_commit(&order_id, &cancel)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    state.metrics.record_outcome(&outcome);
    let status = outcome_status(&outcome);
    Ok((
        status,
        Json(ConfirmResponse {
            code: outcome.code(),
            message: outcome.message().to_string(),
            outcome,
        }),
    ))
}

/// Payment record by gateway order id.
async fn payment_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentRecord>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let record = state
        .coordinator
        .store()
        .payments()
        .find_by_order_id(&order_id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| {
            to_error_response(StoreError::not_found("payment", order_id.as_str()).into())
        })?;

    Ok(Json(record))
}

/// Get a single match.
async fn get_match_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Match>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let found = state
        .coordinator
        .store()
        .matches()
        .find_by_id(id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(StoreError::not_found("match", id.to_string()).into()))?;

    Ok(Json(found))
}

/// Cancel a scheduled match.
async fn cancel_match_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Match>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    let cancelled = state
        .coordinator
        .cancel_match(id, req.reason)
        .await
        .map_err(|e| to_error_response(e.into()))?;
    Ok(Json(cancelled))
}

/// Signed gateway callback.
async fn webhook_handler<S, G>(
    State(state): State<Arc<ApiState<S, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    match handle_webhook(&state, &headers, &body).await {
        Ok(ack) => {
            state.metrics.record_webhook(&ack.event, ack_label(&ack));
            if let Some(outcome) = &ack.outcome {
                state.metrics.record_outcome(outcome);
            }
            Ok(Json(ack))
        },
        Err(e) => {
            state.metrics.record_webhook("unknown", "rejected");
            Err(to_error_response(e))
        },
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn handle_webhook<S, G>(
    state: &ApiState<S, G>,
    headers: &HeaderMap,
    body: &[u8],
) -> DaemonResult<WebhookAck>
where
    S: Store + 'static,
    G: PaymentGatewayPort + 'static,
{
    webhook::authenticate(state.webhook_secret.as_deref(), headers, body)?;
    let event = webhook::parse_event(body)?;
    webhook::apply_event(&state.coordinator, event).await
}

fn ack_label(ack: &WebhookAck) -> &'static str {
    match ack.status {
        webhook::AckStatus::Processed => "processed",
        webhook::AckStatus::Ignored => "ignored",
    }
}

fn outcome_status(outcome: &BookingOutcome) -> StatusCode {
    match outcome {
        BookingOutcome::Committed { .. } => StatusCode::OK,
        BookingOutcome::PaymentPendingRetry { .. } => StatusCode::ACCEPTED,
        BookingOutcome::PaymentFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        BookingOutcome::BookingConflict { .. } => StatusCode::CONFLICT,
    }
}

fn to_error_response(error: DaemonError) -> ApiError {
    let (status, code) = match &error {
        DaemonError::Exec(e) => (status_for(e.code()), e.code()),
        DaemonError::Store(StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, ErrorCode::NotFound)
        },
        DaemonError::Store(StoreError::Domain(_) | StoreError::InvalidState { .. }) => {
            (StatusCode::CONFLICT, ErrorCode::ValidationError)
        },
        DaemonError::Store(_) | DaemonError::Config(_) | DaemonError::Metrics(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError)
        },
        DaemonError::Webhook(_) => (StatusCode::UNAUTHORIZED, ErrorCode::ValidationError),
        DaemonError::Domain(_) | DaemonError::Engine(_) | DaemonError::BadRequest(_) => {
            (StatusCode::BAD_REQUEST, ErrorCode::ValidationError)
        },
    };

    let conflict = match &error {
        DaemonError::Exec(ExecError::SlotConflict(interval)) => Some(interval.clone()),
        _ => None,
    };

    (status, Json(ErrorResponse { error: error.to_string(), code, conflict }))
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::SlotConflict | ErrorCode::PostPaymentConflict => StatusCode::CONFLICT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::PaymentFailed => StatusCode::PAYMENT_REQUIRED,
        ErrorCode::PaymentTimedOut => StatusCode::ACCEPTED,
        ErrorCode::GatewayError => StatusCode::BAD_GATEWAY,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// Tests
// =============================================================================
