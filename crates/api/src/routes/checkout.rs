//! Order placement endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use engine::{CheckoutRequest, PlacedOrder};
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /checkout: reserve stock, record the order and open a hosted checkout.
#[tracing::instrument(skip_all, fields(lines = req.items.len()))]
pub async fn place<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let caller = state.identity.resolve(&headers);
    let placed = state.checkout.place_order(caller.as_deref(), req).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}
