//! Order read endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use domain::{Customer, Order};
use serde::Deserialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::routes::parse_order_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderAccessQuery {
    /// Payment reference from the guest's order link.
    pub reference: Option<String>,
}

/// GET /orders/:id: read an order as its owner or through a guest link.
///
/// Orders the caller may not see are reported as missing.
#[tracing::instrument(skip(state, headers, query))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<OrderAccessQuery>,
    headers: HeaderMap,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let caller = state.identity.resolve(&headers);
    let order = state.checkout.get_order(&order_id).await?;

    if can_view(&order, caller.as_deref(), query.reference.as_deref()) {
        Ok(Json(order))
    } else {
        tracing::debug!(%order_id, "order hidden from caller");
        Err(ApiError::NotFound(format!("Order {id} not found")))
    }
}

fn can_view(order: &Order, caller: Option<&str>, reference: Option<&str>) -> bool {
    let owns = match (&order.customer, caller) {
        (Customer::User { user_id, .. }, Some(caller)) => user_id == caller,
        _ => false,
    };
    owns || reference.is_some_and(|r| order.payment.reference == r)
}
