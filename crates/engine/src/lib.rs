//! Inventory reservation and idempotent fulfillment.
//!
//! This crate turns carts into paid, fulfilled orders without overselling:
//! 1. Price the cart against current catalog state
//! 2. Reserve stock and record the order in one transaction
//! 3. Confirm payment and deduct the reserved stock exactly once
//!
//! Holds that outlive their window unpaid are released by the reaper.
//! Legacy clients that send identifier fingerprints are served through the
//! [`IdResolutionCache`].

pub mod cache;
pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod pricing;
pub mod reaper;
pub mod reservation;
pub mod services;

pub use cache::{FingerprintIndex, IdResolutionCache, fingerprint};
pub use checkout::{CheckoutRequest, CheckoutService, CheckoutSettings, PlacedOrder};
pub use error::{EngineError, Result};
pub use fulfillment::{Confirmation, DeductionOutcome, FulfillmentConfirmer};
pub use pricing::{
    CartLine, CartPricingEngine, ItemRef, PricedCart, PricedCartItem, PricingOptions,
    ShippingFeeTable, TAX_RATE_BPS,
};
pub use reaper::{ReaperReport, ReservationReaper};
pub use reservation::ReservationManager;
pub use services::{
    GatewayPaymentStatus, HostedCheckout, HostedCheckoutRequest, InMemoryNotifier,
    InMemoryPaymentGateway, LoggingNotifier, Notifier, PaymentGateway, TransactionVerification,
};
