//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Money, PaymentStatus};

use crate::error::EngineError;

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Expired,
}

impl GatewayPaymentStatus {
    /// Parses the gateway's wire value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// The order payment status a failed gateway status maps to.
    pub fn failure_status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Failed | Self::Expired => Some(PaymentStatus::Failed),
            Self::Cancelled => Some(PaymentStatus::Cancelled),
            Self::Pending | Self::Paid => None,
        }
    }
}

/// Input for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct HostedCheckoutRequest {
    pub amount: Money,
    pub customer_name: String,
    pub customer_email: Option<String>,
    /// Our payment reference; echoed back on webhooks.
    pub reference: String,
    pub description: String,
}

/// A created hosted checkout session.
#[derive(Debug, Clone)]
pub struct HostedCheckout {
    pub checkout_url: String,
    pub transaction_reference: String,
}

/// Result of polling the gateway for a transaction.
#[derive(Debug, Clone)]
pub struct TransactionVerification {
    pub status: GatewayPaymentStatus,
    pub paid_on: Option<DateTime<Utc>>,
}

/// Trait for the external hosted-payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted checkout page for the customer.
    async fn create_hosted_checkout(
        &self,
        request: HostedCheckoutRequest,
    ) -> Result<HostedCheckout, EngineError>;

    /// Looks up a transaction's current status.
    async fn verify_transaction(
        &self,
        transaction_reference: &str,
    ) -> Result<TransactionVerification, EngineError>;
}

#[derive(Debug)]
struct Session {
    reference: String,
    amount: Money,
    status: GatewayPaymentStatus,
    paid_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<String, Session>,
    next_id: u32,
    fail_on_checkout: bool,
    fail_on_verify: bool,
}

/// In-memory gateway for tests and local runs.
///
/// Sessions stay `Pending` until [`InMemoryPaymentGateway::settle`] is called.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures checkout creation to fail.
    pub fn set_fail_on_checkout(&self, fail: bool) {
        self.write().fail_on_checkout = fail;
    }

    /// Configures verification to fail.
    pub fn set_fail_on_verify(&self, fail: bool) {
        self.write().fail_on_verify = fail;
    }

    /// Returns the number of checkout sessions created.
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    /// Returns the amount charged for a transaction.
    pub fn amount(&self, transaction_reference: &str) -> Option<Money> {
        self.read()
            .sessions
            .get(transaction_reference)
            .map(|s| s.amount)
    }

    /// Finds the gateway transaction created for our payment reference.
    pub fn transaction_for(&self, reference: &str) -> Option<String> {
        self.read()
            .sessions
            .iter()
            .find(|(_, s)| s.reference == reference)
            .map(|(tx, _)| tx.clone())
    }

    /// Moves a session to a final status, as the customer would on the hosted page.
    pub fn settle(
        &self,
        transaction_reference: &str,
        status: GatewayPaymentStatus,
        paid_on: Option<DateTime<Utc>>,
    ) -> bool {
        match self.write().sessions.get_mut(transaction_reference) {
            Some(session) => {
                session.status = status;
                session.paid_on = paid_on;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_hosted_checkout(
        &self,
        request: HostedCheckoutRequest,
    ) -> Result<HostedCheckout, EngineError> {
        let mut state = self.write();

        if state.fail_on_checkout {
            return Err(EngineError::Payment("Checkout session rejected".to_string()));
        }

        state.next_id += 1;
        let transaction_reference = format!("TXN-{:06}", state.next_id);
        state.sessions.insert(
            transaction_reference.clone(),
            Session {
                reference: request.reference,
                amount: request.amount,
                status: GatewayPaymentStatus::Pending,
                paid_on: None,
            },
        );

        Ok(HostedCheckout {
            checkout_url: format!("https://checkout.invalid/pay/{transaction_reference}"),
            transaction_reference,
        })
    }

    async fn verify_transaction(
        &self,
        transaction_reference: &str,
    ) -> Result<TransactionVerification, EngineError> {
        let state = self.read();

        if state.fail_on_verify {
            return Err(EngineError::Payment("Gateway unavailable".to_string()));
        }

        state
            .sessions
            .get(transaction_reference)
            .map(|s| TransactionVerification {
                status: s.status,
                paid_on: s.paid_on,
            })
            .ok_or_else(|| {
                EngineError::Payment(format!("Unknown transaction {transaction_reference}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reference: &str) -> HostedCheckoutRequest {
        HostedCheckoutRequest {
            amount: Money::from_units(50),
            customer_name: "Ada Obi".to_string(),
            customer_email: Some("ada@example.com".to_string()),
            reference: reference.to_string(),
            description: "Order ORD-20260101-ABC123".to_string(),
        }
    }

    #[test]
    fn test_parse_gateway_status() {
        assert_eq!(GatewayPaymentStatus::parse("PAID"), Some(GatewayPaymentStatus::Paid));
        assert_eq!(GatewayPaymentStatus::parse("expired"), Some(GatewayPaymentStatus::Expired));
        assert_eq!(GatewayPaymentStatus::parse("OVERPAID"), None);
        assert_eq!(
            GatewayPaymentStatus::Expired.failure_status(),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            GatewayPaymentStatus::Cancelled.failure_status(),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(GatewayPaymentStatus::Paid.failure_status(), None);
    }

    #[tokio::test]
    async fn test_checkout_then_settle() {
        let gateway = InMemoryPaymentGateway::new();
        let session = gateway.create_hosted_checkout(request("PAY-1")).await.unwrap();
        assert_eq!(session.transaction_reference, "TXN-000001");
        assert!(session.checkout_url.ends_with("TXN-000001"));
        assert_eq!(gateway.transaction_for("PAY-1"), Some("TXN-000001".to_string()));

        let pending = gateway.verify_transaction("TXN-000001").await.unwrap();
        assert_eq!(pending.status, GatewayPaymentStatus::Pending);

        let paid_on = Utc::now();
        assert!(gateway.settle("TXN-000001", GatewayPaymentStatus::Paid, Some(paid_on)));
        let paid = gateway.verify_transaction("TXN-000001").await.unwrap();
        assert_eq!(paid.status, GatewayPaymentStatus::Paid);
        assert_eq!(paid.paid_on, Some(paid_on));
    }

    #[tokio::test]
    async fn test_fail_switches() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_checkout(true);
        assert!(gateway.create_hosted_checkout(request("PAY-1")).await.is_err());
        assert_eq!(gateway.session_count(), 0);

        gateway.set_fail_on_checkout(false);
        gateway.create_hosted_checkout(request("PAY-2")).await.unwrap();
        gateway.set_fail_on_verify(true);
        assert!(matches!(
            gateway.verify_transaction("TXN-000001").await,
            Err(EngineError::Payment(_))
        ));
    }
}
