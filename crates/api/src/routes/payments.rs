//! Payment gateway webhook and verify poll.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use domain::Order;
use engine::{DeductionOutcome, EngineError, GatewayPaymentStatus};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::ApiError;
use crate::signature::{self, SIGNATURE_HEADER};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event_type: String,
    pub event_data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventData {
    pub transaction_reference: String,
    #[serde(default)]
    pub payment_reference: Option<String>,
    pub payment_status: String,
    #[serde(default)]
    pub paid_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl WebhookEventData {
    /// Our payment reference when the gateway echoes it, else its own.
    fn reference(&self) -> &str {
        self.payment_reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.transaction_reference)
    }
}

/// What the webhook did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Deducted,
    AlreadyDeducted,
    IntegrityFailure,
    PaymentFailed,
    Ignored,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub action: WebhookAction,
}

impl WebhookAck {
    fn new(action: WebhookAction) -> Json<Self> {
        Json(Self {
            received: true,
            action,
        })
    }
}

/// POST /payments/webhook: apply a signed payment notification.
///
/// Anything the gateway should not redeliver is acknowledged with 200: unknown
/// references, unhandled statuses and paid orders that cannot be fulfilled.
/// Only store failures surface as errors so the gateway retries them.
#[tracing::instrument(skip_all)]
pub async fn webhook<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = signature::verify(&state.webhook_secret, &body, provided) {
        tracing::warn!(error = %e, "rejected webhook signature");
        metrics::counter!("webhook_signature_rejections_total").increment(1);
        return Err(ApiError::Unauthorized(format!("Invalid webhook signature: {e}")));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {e}")))?;
    let event = &payload.event_data;
    let reference = event.reference();
    tracing::info!(
        event_type = %payload.event_type,
        reference,
        payment_status = %event.payment_status,
        "payment webhook received"
    );

    let Some(status) = GatewayPaymentStatus::parse(&event.payment_status) else {
        tracing::info!(payment_status = %event.payment_status, "unhandled payment status");
        return Ok(WebhookAck::new(WebhookAction::Ignored));
    };

    let confirmer = state.checkout.confirmer();
    let action = match status {
        GatewayPaymentStatus::Paid => {
            match confirmer.confirm_paid_and_deduct(reference, event.paid_on).await {
                Ok(confirmation) => match confirmation.outcome {
                    DeductionOutcome::Deducted => WebhookAction::Deducted,
                    DeductionOutcome::AlreadyDeducted => WebhookAction::AlreadyDeducted,
                    DeductionOutcome::IntegrityFailure { reason } => {
                        tracing::error!(
                            order_number = %confirmation.order.order_number,
                            %reason,
                            "paid order could not be fulfilled"
                        );
                        WebhookAction::IntegrityFailure
                    }
                },
                Err(e) => return ignore_unknown(e, reference),
            }
        }
        GatewayPaymentStatus::Pending => WebhookAction::Ignored,
        failed => match failed.failure_status() {
            Some(failure) => match confirmer.mark_payment_failed(reference, failure).await {
                Ok(_) => WebhookAction::PaymentFailed,
                Err(e) => return ignore_unknown(e, reference),
            },
            None => WebhookAction::Ignored,
        },
    };

    Ok(WebhookAck::new(action))
}

fn ignore_unknown(err: EngineError, reference: &str) -> Result<Json<WebhookAck>, ApiError> {
    match err {
        EngineError::NotFound(_) => {
            tracing::warn!(reference, "webhook for unknown payment reference");
            Ok(WebhookAck::new(WebhookAction::Ignored))
        }
        other => Err(other.into()),
    }
}

/// POST /payments/:reference/verify: poll the gateway and apply the result.
#[tracing::instrument(skip(state))]
pub async fn verify<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.checkout.verify_payment(&reference).await?;
    Ok(Json(order))
}
