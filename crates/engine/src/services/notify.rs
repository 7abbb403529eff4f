//! Transactional e-mail collaborator.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::{Order, OrderNumber};

use crate::error::EngineError;

/// Sends customer notifications. Delivery itself is external.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends the order confirmation after payment and deduction succeed.
    async fn order_confirmed(&self, order: &Order) -> Result<(), EngineError>;
}

/// Notifier that only logs. Used when no mail service is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn order_confirmed(&self, order: &Order) -> Result<(), EngineError> {
        tracing::info!(
            order_number = %order.order_number,
            email = order.customer.email().unwrap_or("-"),
            total = %order.total,
            "order confirmation queued"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderNumber>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures sends to fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_send = fail;
    }

    /// Returns the number of confirmations sent.
    pub fn sent_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .len()
    }

    /// Returns true if a confirmation was sent for the order number.
    pub fn has_sent(&self, order_number: &OrderNumber) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .contains(order_number)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn order_confirmed(&self, order: &Order) -> Result<(), EngineError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_send {
            return Err(EngineError::Notification("Mail relay refused".to_string()));
        }

        state.sent.push(order.order_number.clone());
        Ok(())
    }
}
