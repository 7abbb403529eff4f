//! Cart pricing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use engine::{CartLine, PricedCart};
use serde::Deserialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceCartRequest {
    pub items: Vec<CartLine>,
    /// Matched against the configured shipping fee table.
    #[serde(default)]
    pub shipping_location: Option<String>,
}

/// POST /cart/price: price a cart against the current catalog.
#[tracing::instrument(skip(state, req), fields(lines = req.items.len()))]
pub async fn price<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PriceCartRequest>,
) -> Result<Json<PricedCart>, ApiError> {
    let options = state
        .checkout
        .settings()
        .pricing_options(req.shipping_location);
    let cart = state.checkout.pricing().price(&req.items, &options).await?;
    Ok(Json(cart))
}
