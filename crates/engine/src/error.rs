//! Engine error types.

use std::sync::Arc;

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while pricing, reserving or fulfilling orders.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown product, variant or order.
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more lines cannot be reserved. Each message names the product.
    #[error("Insufficient stock: {}", .0.join("; "))]
    InsufficientStock(Vec<String>),

    /// Stock changed underneath the transaction. Safe to retry the whole operation.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A paid order cannot be fulfilled and needs an operator.
    #[error("Deduction failed for order {order_number}: {reason}")]
    DeductionIntegrity { order_number: String, reason: String },

    /// The payment gateway rejected or failed a call.
    #[error("Payment gateway error: {0}")]
    Payment(String),

    /// The notifier could not deliver a message.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Storage error.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Domain rule violation.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Building the fingerprint index failed. Shared by every waiter on the build.
    #[error("Failed to build identifier index: {0}")]
    IndexBuild(Arc<StoreError>),
}

impl EngineError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::ConcurrencyConflict(_) => true,
            EngineError::Store(e) => e.is_retryable(),
            EngineError::IndexBuild(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict(msg) => EngineError::ConcurrencyConflict(msg),
            other => EngineError::Store(other),
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Upper bound on diagnostic messages carried by a single error.
pub const MAX_ERROR_MESSAGES: usize = 5;

/// Truncates `messages` to [`MAX_ERROR_MESSAGES`], noting how many were dropped.
pub(crate) fn capped(mut messages: Vec<String>) -> Vec<String> {
    if messages.len() > MAX_ERROR_MESSAGES {
        let dropped = messages.len() - MAX_ERROR_MESSAGES;
        messages.truncate(MAX_ERROR_MESSAGES);
        messages.push(format!("... and {dropped} more"));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_engine_conflict() {
        let err: EngineError = StoreError::ConcurrencyConflict("order number taken".into()).into();
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_capped_keeps_bounded_messages() {
        let messages: Vec<String> = (0..8).map(|i| format!("line {i}")).collect();
        let capped = capped(messages);
        assert_eq!(capped.len(), MAX_ERROR_MESSAGES + 1);
        assert_eq!(capped.last().unwrap(), "... and 3 more");

        let short = super::capped(vec!["only".to_string()]);
        assert_eq!(short, vec!["only".to_string()]);
    }

    #[test]
    fn test_insufficient_stock_display_joins_messages() {
        let err = EngineError::InsufficientStock(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Insufficient stock: a; b");
    }
}
