//! HTTP route handlers.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;

use common::OrderId;

use crate::error::ApiError;

/// Parses an order id path segment.
pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(e.to_string()))
}
