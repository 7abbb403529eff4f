//! External collaborators the engine calls out to.

pub mod notify;
pub mod payment;

pub use notify::{InMemoryNotifier, LoggingNotifier, Notifier};
pub use payment::{
    GatewayPaymentStatus, HostedCheckout, HostedCheckoutRequest, InMemoryPaymentGateway,
    PaymentGateway, TransactionVerification,
};
