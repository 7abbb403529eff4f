//! Operator endpoints: status progression, deduction retry, manual reaping.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use domain::{Order, OrderStatus};
use engine::ReaperReport;
use serde::Deserialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::routes::parse_order_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseExpiredQuery {
    pub limit: Option<usize>,
}

/// PUT /admin/orders/:id/status: move an order along its status graph.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let next: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    let order = state.checkout.update_status(&order_id, next).await?;
    Ok(Json(order))
}

/// POST /admin/orders/:id/retry-deduction: re-run a failed deduction once.
#[tracing::instrument(skip(state))]
pub async fn retry_deduction<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .checkout
        .confirmer()
        .retry_deduction(&order_id)
        .await?
        .into_result()?;
    Ok(Json(order))
}

/// POST /admin/reservations/release-expired: run one reaper pass now.
#[tracing::instrument(skip(state))]
pub async fn release_expired<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ReleaseExpiredQuery>,
) -> Result<Json<ReaperReport>, ApiError> {
    let limit = query.limit.unwrap_or(state.reaper_batch_limit);
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be positive".to_string()));
    }
    let report = state.reaper.release_expired(limit).await?;
    Ok(Json(report))
}
