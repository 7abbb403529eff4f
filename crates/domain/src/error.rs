//! Domain error types.

use thiserror::Error;

use crate::order::{OrderStatus, PaymentStatus};

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Catalog data failed input validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// Variant data failed input validation.
    #[error("Invalid variant {variant_id}: {reason}")]
    InvalidVariant { variant_id: String, reason: String },

    /// Address is incomplete.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A hold was requested for more units than are available.
    #[error("Cannot hold {requested} units of variant {variant_id}: only {available} available")]
    HoldExceedsAvailable {
        variant_id: String,
        requested: u32,
        available: u32,
    },

    /// Summed line quantities for one variant exceed what can be counted.
    #[error("Quantity for variant {0} is too large")]
    QuantityOverflow(String),

    /// Order status cannot move between the given states.
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Payment status cannot move between the given states.
    #[error("Invalid payment status transition: {from} -> {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },
}
