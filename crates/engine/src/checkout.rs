//! Order placement and payment follow-up.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::OrderId;
use domain::{
    Address, Customer, Money, NewOrder, Order, OrderNumber, OrderStatus, PaymentStatus,
    new_payment_reference,
};
use serde::{Deserialize, Serialize};
use store::{CommerceStore, StoreTransaction};

use crate::error::{EngineError, Result};
use crate::fulfillment::FulfillmentConfirmer;
use crate::pricing::{CartLine, CartPricingEngine, PricingOptions, ShippingFeeTable};
use crate::reservation::ReservationManager;
use crate::services::{GatewayPaymentStatus, HostedCheckoutRequest, Notifier, PaymentGateway};

/// Order numbers drawn before checkout gives up on finding a free one.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 10;

/// Default reservation hold, in seconds.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 900;

/// Checkout configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub reservation_ttl: Duration,
    pub free_shipping_threshold: Option<Money>,
    pub shipping_fees: ShippingFeeTable,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::seconds(DEFAULT_RESERVATION_TTL_SECS),
            free_shipping_threshold: None,
            shipping_fees: ShippingFeeTable::default(),
        }
    }
}

impl CheckoutSettings {
    /// Pricing options for a cart shipped to `location`.
    pub fn pricing_options(&self, location: Option<String>) -> PricingOptions {
        PricingOptions {
            shipping_location: location,
            free_shipping_threshold: self.free_shipping_threshold,
            fee_table: self.shipping_fees.clone(),
        }
    }
}

/// Checkout input. Guests must supply an e-mail address.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartLine>,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A placed order and where to send the customer to pay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    pub checkout_url: String,
}

/// Orchestrates pricing, reservation, order creation and the payment gateway.
pub struct CheckoutService<S, G, N> {
    store: S,
    pricing: CartPricingEngine<S>,
    reservations: ReservationManager,
    confirmer: FulfillmentConfirmer<S, N>,
    gateway: G,
    settings: CheckoutSettings,
}

impl<S, G, N> CheckoutService<S, G, N>
where
    S: CommerceStore + Clone + 'static,
    G: PaymentGateway,
    N: Notifier,
{
    /// Creates a new checkout service.
    pub fn new(
        store: S,
        pricing: CartPricingEngine<S>,
        gateway: G,
        notifier: N,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            confirmer: FulfillmentConfirmer::new(store.clone(), notifier),
            store,
            pricing,
            reservations: ReservationManager::new(),
            gateway,
            settings,
        }
    }

    pub fn pricing(&self) -> &CartPricingEngine<S> {
        &self.pricing
    }

    pub fn confirmer(&self) -> &FulfillmentConfirmer<S, N> {
        &self.confirmer
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Prices the cart, reserves its stock, records the order and opens a
    /// hosted checkout.
    ///
    /// The reservation and the order row commit together. If the gateway
    /// refuses the checkout the hold is released straight away.
    #[tracing::instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn place_order(
        &self,
        caller: Option<&str>,
        request: CheckoutRequest,
    ) -> Result<PlacedOrder> {
        let started = Instant::now();
        let customer = customer_for(caller, request.email.as_deref())?;
        request
            .shipping_address
            .validate()
            .map_err(|e| EngineError::Validation(format!("shipping address: {e}")))?;
        let billing_address = request
            .billing_address
            .unwrap_or_else(|| request.shipping_address.clone());

        let options = self
            .settings
            .pricing_options(Some(request.shipping_address.state.clone()));
        let cart = self.pricing.price(&request.items, &options).await?;
        if cart.is_empty() {
            return Err(EngineError::Validation(
                "cart has no purchasable items".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let order_number = unique_order_number(&mut tx, now).await?;
        let items = cart.order_items();
        self.reservations.reserve(&mut tx, &items).await?;

        let order = Order::place(
            NewOrder {
                order_number,
                customer,
                items,
                shipping_address: request.shipping_address,
                billing_address,
                subtotal: cart.subtotal,
                shipping: cart.shipping,
                tax: cart.tax,
                total: cart.total,
                payment_reference: new_payment_reference(),
            },
            now,
            self.settings.reservation_ttl,
        );
        tx.insert_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            total = %order.total,
            units = order.total_quantity(),
            "order placed with reservation"
        );

        let placed = self.open_hosted_checkout(order).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        placed
    }

    async fn open_hosted_checkout(&self, order: Order) -> Result<PlacedOrder> {
        let request = HostedCheckoutRequest {
            amount: order.total,
            customer_name: order.shipping_address.full_name.clone(),
            customer_email: order.customer.email().map(str::to_string),
            reference: order.payment.reference.clone(),
            description: format!("Order {}", order.order_number),
        };

        let session = match self.gateway.create_hosted_checkout(request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    order_number = %order.order_number,
                    error = %e,
                    "hosted checkout failed, releasing reservation"
                );
                if let Err(release_err) = self
                    .confirmer
                    .mark_payment_failed(&order.payment.reference, PaymentStatus::Failed)
                    .await
                {
                    tracing::error!(
                        order_number = %order.order_number,
                        error = %release_err,
                        "could not release reservation after gateway failure"
                    );
                }
                return Err(match e {
                    EngineError::Payment(_) => e,
                    other => EngineError::Payment(other.to_string()),
                });
            }
        };

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order(&order.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {}", order.id)))?;
        order.payment.transaction_reference = Some(session.transaction_reference);
        order.payment.checkout_url = Some(session.checkout_url.clone());
        order.updated_at = Utc::now();
        tx.save_order(&order).await?;
        tx.commit().await?;

        Ok(PlacedOrder {
            order,
            checkout_url: session.checkout_url,
        })
    }

    /// Polls the gateway for a payment and applies the result.
    ///
    /// A pending payment leaves the order unchanged. A paid order that cannot
    /// be fulfilled is reported as [`EngineError::DeductionIntegrity`].
    #[tracing::instrument(skip(self))]
    pub async fn verify_payment(&self, reference: &str) -> Result<Order> {
        let order = self
            .store
            .find_order_by_payment_reference(reference)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("order with payment reference {reference}"))
            })?;
        let transaction_reference = order.payment.transaction_reference.clone().ok_or_else(|| {
            EngineError::Validation(format!(
                "order {} has no gateway transaction",
                order.order_number
            ))
        })?;

        let verification = self.gateway.verify_transaction(&transaction_reference).await?;
        match verification.status {
            GatewayPaymentStatus::Paid => self
                .confirmer
                .confirm_paid_and_deduct(&order.payment.reference, verification.paid_on)
                .await?
                .into_result(),
            GatewayPaymentStatus::Pending => Ok(order),
            failed => match failed.failure_status() {
                Some(status) => {
                    self.confirmer
                        .mark_payment_failed(&order.payment.reference, status)
                        .await
                }
                None => Ok(order),
            },
        }
    }

    /// Admin-driven status change.
    ///
    /// Cancelling an unpaid order with a live hold releases the hold in the
    /// same transaction.
    #[tracing::instrument(skip(self, order_id), fields(order_id = %order_id))]
    pub async fn update_status(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;

        order
            .transition_to(next, now)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        if next == OrderStatus::Cancelled && order.payment.status == PaymentStatus::Pending {
            self.reservations.release(&mut tx, &mut order, now).await?;
        }
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            status = %order.status,
            "order status updated"
        );
        Ok(order)
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))
    }
}

fn customer_for(caller: Option<&str>, email: Option<&str>) -> Result<Customer> {
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    match caller {
        Some(user_id) => Ok(Customer::User {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
        }),
        None => match email {
            Some(email) if email.contains('@') => Ok(Customer::Guest {
                email: email.to_string(),
            }),
            Some(email) => Err(EngineError::Validation(format!(
                "invalid guest e-mail address {email}"
            ))),
            None => Err(EngineError::Validation(
                "guest checkout requires an e-mail address".to_string(),
            )),
        },
    }
}

async fn unique_order_number<T: StoreTransaction>(
    tx: &mut T,
    now: DateTime<Utc>,
) -> Result<OrderNumber> {
    for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
        let candidate = OrderNumber::generate(now);
        if !tx.order_number_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(order_number = %candidate, "order number taken, drawing another");
    }
    Err(EngineError::ConcurrencyConflict(format!(
        "no free order number after {MAX_ORDER_NUMBER_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_needs_email() {
        assert!(matches!(
            customer_for(None, None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            customer_for(None, Some("   ")),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            customer_for(None, Some("nope")),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(
            customer_for(None, Some(" ada@example.com ")).unwrap(),
            Customer::Guest {
                email: "ada@example.com".into()
            }
        );
    }

    #[test]
    fn test_signed_in_caller_owns_order() {
        let customer = customer_for(Some("user-42"), None).unwrap();
        assert_eq!(customer.user_id(), Some("user-42"));
        assert_eq!(customer.email(), None);
    }

    #[test]
    fn test_pricing_options_carry_shipping_settings() {
        let settings = CheckoutSettings {
            free_shipping_threshold: Some(Money::from_units(100)),
            shipping_fees: ShippingFeeTable::new([("Lagos".to_string(), Money::from_units(5))]),
            ..Default::default()
        };
        let options = settings.pricing_options(Some("Lagos".into()));
        assert_eq!(options.free_shipping_threshold, Some(Money::from_units(100)));
        assert_eq!(options.fee_table.fee_for("Lagos"), Some(Money::from_units(5)));
        assert_eq!(settings.reservation_ttl, Duration::minutes(15));
    }
}
