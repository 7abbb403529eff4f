//! Payment confirmation and permanent stock deduction.
//!
//! Confirmation is keyed by payment reference and may be replayed any number
//! of times (webhook retries, verify polls). Stock is deducted at most once:
//! `deducted_at` is checked and stamped in the same transaction that moves
//! the stock. A paid order whose stock cannot be deducted is pinned with a
//! deduction error and only an operator retry runs the deduction again.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, VariantId};
use domain::{Order, PaymentStatus, Product};
use serde::Serialize;
use store::{CommerceStore, StoreTransaction, StoreTransactionExt};

use crate::error::{EngineError, Result, capped};
use crate::reservation::ReservationManager;
use crate::services::Notifier;

/// What a confirmation did to stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DeductionOutcome {
    /// Stock was deducted by this call.
    Deducted,
    /// Stock had already been deducted by an earlier call.
    AlreadyDeducted,
    /// The order is paid but its stock cannot be deducted.
    IntegrityFailure { reason: String },
}

/// Result of a confirmation: the saved order and what happened to stock.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub order: Order,
    pub outcome: DeductionOutcome,
}

impl Confirmation {
    /// Converts a pinned failure into [`EngineError::DeductionIntegrity`].
    pub fn into_result(self) -> Result<Order> {
        match self.outcome {
            DeductionOutcome::IntegrityFailure { reason } => Err(EngineError::DeductionIntegrity {
                order_number: self.order.order_number.to_string(),
                reason,
            }),
            _ => Ok(self.order),
        }
    }
}

/// Confirms payments and converts holds into deductions.
pub struct FulfillmentConfirmer<S, N> {
    store: S,
    reservations: ReservationManager,
    notifier: N,
}

impl<S, N> FulfillmentConfirmer<S, N>
where
    S: CommerceStore,
    N: Notifier,
{
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            reservations: ReservationManager::new(),
            notifier,
        }
    }

    /// Marks the order paid and deducts its stock once.
    ///
    /// Safe to call repeatedly for the same reference. Replays after a
    /// successful deduction return [`DeductionOutcome::AlreadyDeducted`];
    /// replays after a failed deduction return the pinned failure without
    /// retrying it.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_paid_and_deduct(
        &self,
        reference: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Confirmation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .find_order_by_payment_reference(reference)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("order with payment reference {reference}"))
            })?;

        if matches!(
            order.payment.status,
            PaymentStatus::Failed | PaymentStatus::Cancelled
        ) {
            tracing::warn!(
                order_number = %order.order_number,
                previous = %order.payment.status,
                "payment confirmed after a recorded failure"
            );
        }
        order.record_payment(paid_at, now);

        let outcome = if order.is_deducted() {
            order.clear_deduction_failure();
            DeductionOutcome::AlreadyDeducted
        } else if let Some(reason) = order.inventory.deduction_error.clone() {
            DeductionOutcome::IntegrityFailure { reason }
        } else {
            self.deduct(&mut tx, &mut order, now).await?
        };

        tx.save_order(&order).await?;
        tx.commit().await?;

        if outcome == DeductionOutcome::Deducted {
            self.notify(&order).await;
        }
        Ok(Confirmation { order, outcome })
    }

    /// Operator retry for an order pinned by a failed deduction.
    ///
    /// Clears the failure markers and runs validation and deduction once more.
    #[tracing::instrument(skip(self, order_id), fields(order_id = %order_id))]
    pub async fn retry_deduction(&self, order_id: &OrderId) -> Result<Confirmation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order(order_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;

        if order.payment.status != PaymentStatus::Paid {
            return Err(EngineError::Validation(format!(
                "order {} is not paid",
                order.order_number
            )));
        }
        if !order.has_deduction_failure() {
            return Err(EngineError::Validation(format!(
                "order {} has no failed deduction to retry",
                order.order_number
            )));
        }

        tracing::info!(
            order_number = %order.order_number,
            previous_error = order.inventory.deduction_error.as_deref().unwrap_or(""),
            "retrying deduction"
        );
        order.clear_deduction_failure();
        // Revives the Failed status now that no failure is recorded.
        order.record_payment(None, now);
        let outcome = self.deduct(&mut tx, &mut order, now).await?;

        tx.save_order(&order).await?;
        tx.commit().await?;

        if outcome == DeductionOutcome::Deducted {
            self.notify(&order).await;
        }
        Ok(Confirmation { order, outcome })
    }

    /// Records a failed or cancelled payment and releases the order's hold.
    ///
    /// Orders whose payment is no longer pending are returned unchanged, so a
    /// late failure never undoes a payment.
    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_failed(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<Order> {
        if !matches!(status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
            return Err(EngineError::Validation(format!(
                "{status} is not a payment failure status"
            )));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .find_order_by_payment_reference(reference)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("order with payment reference {reference}"))
            })?;

        if !order.record_payment_failure(status, now) {
            tracing::info!(
                order_number = %order.order_number,
                payment_status = %order.payment.status,
                "ignoring payment failure for settled payment"
            );
            return Ok(order);
        }

        self.reservations.release(&mut tx, &mut order, now).await?;
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            payment_status = %order.payment.status,
            "payment failure recorded"
        );
        Ok(order)
    }

    /// Validates every line, then deducts all of them or none.
    async fn deduct(
        &self,
        tx: &mut S::Tx,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<DeductionOutcome> {
        let required = order.required_quantities()?;
        let held = order.has_live_reservation();
        let ids: Vec<ProductId> = required.keys().cloned().collect();
        let mut products = tx.products_by_id(&ids).await?;

        let problems = validate_deduction(&products, &required, held);
        if !problems.is_empty() {
            let reason = capped(problems).join("; ");
            order.mark_deduction_failed(reason.clone(), now);

            metrics::counter!("deduction_failures_total").increment(1);
            tracing::error!(
                order_number = %order.order_number,
                reason = %reason,
                "paid order cannot be fulfilled, manual resolution required"
            );
            return Ok(DeductionOutcome::IntegrityFailure { reason });
        }

        for (product_id, variants) in &required {
            if let Some(product) = products.get_mut(product_id) {
                for (variant_id, quantity) in variants {
                    if let Some(variant) = product.variant_mut(variant_id) {
                        if held {
                            variant.release_hold(*quantity);
                        }
                        variant.deduct(*quantity);
                    }
                }
            }
        }
        tx.save_products(&products).await?;

        if held {
            order.mark_reservation_released(now);
        }
        order.mark_deducted(now);

        metrics::counter!("deductions_total").increment(1);
        tracing::info!(
            order_number = %order.order_number,
            units = order.total_quantity(),
            from_hold = held,
            "stock deducted"
        );
        Ok(DeductionOutcome::Deducted)
    }

    async fn notify(&self, order: &Order) {
        if let Err(e) = self.notifier.order_confirmed(order).await {
            tracing::warn!(
                order_number = %order.order_number,
                error = %e,
                "order confirmation could not be sent"
            );
        }
    }
}

/// Problems that block deducting `required` from `products`.
///
/// With a live hold the units must be both on hand and held; without one
/// they must be available to sell.
fn validate_deduction(
    products: &HashMap<ProductId, Product>,
    required: &BTreeMap<ProductId, BTreeMap<VariantId, u32>>,
    held: bool,
) -> Vec<String> {
    let mut problems = Vec::new();
    for (product_id, variants) in required {
        let Some(product) = products.get(product_id) else {
            problems.push(format!("Product {product_id} not found"));
            continue;
        };
        for (variant_id, quantity) in variants {
            let Some(variant) = product.variant(variant_id) else {
                problems.push(format!("Variant {variant_id} of {} not found", product.name));
                continue;
            };
            let label = format!("{} ({} / {})", product.name, variant.color, variant.size);
            if variant.quantity() < *quantity {
                problems.push(format!(
                    "{label}: requires {quantity}, on hand {}",
                    variant.quantity()
                ));
            } else if held && variant.reserved_quantity() < *quantity {
                problems.push(format!(
                    "{label}: requires {quantity}, held {}",
                    variant.reserved_quantity()
                ));
            } else if !held && variant.available() < *quantity {
                problems.push(format!(
                    "{label}: requires {quantity}, available {}",
                    variant.available()
                ));
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use domain::{Money, Size, Variant};

    use super::*;

    fn product(quantity: u32, reserved: u32) -> Product {
        let mut variant =
            Variant::new(VariantId::new(), "Teal", Size::Medium, Money::from_units(10), quantity)
                .with_image("t.jpg");
        variant.hold(reserved).unwrap();
        Product::new(ProductId::new(), "Boubou", "boubou", "Flowing boubou", "Womenswear")
            .with_variant(variant)
    }

    fn required(p: &Product, quantity: u32) -> BTreeMap<ProductId, BTreeMap<VariantId, u32>> {
        BTreeMap::from([(
            p.id.clone(),
            BTreeMap::from([(p.variants[0].id.clone(), quantity)]),
        )])
    }

    fn by_id(p: &Product) -> HashMap<ProductId, Product> {
        HashMap::from([(p.id.clone(), p.clone())])
    }

    #[test]
    fn test_held_deduction_needs_hold_and_stock() {
        let p = product(5, 2);
        assert!(validate_deduction(&by_id(&p), &required(&p, 2), true).is_empty());

        let problems = validate_deduction(&by_id(&p), &required(&p, 3), true);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("held 2"));
    }

    #[test]
    fn test_unheld_deduction_needs_available_stock() {
        let p = product(5, 4);
        let problems = validate_deduction(&by_id(&p), &required(&p, 2), false);
        assert!(problems[0].contains("available 1"));
        assert!(validate_deduction(&by_id(&p), &required(&p, 1), false).is_empty());
    }

    #[test]
    fn test_missing_catalog_entries_are_reported() {
        let p = product(5, 0);
        let problems = validate_deduction(&HashMap::new(), &required(&p, 1), false);
        assert!(problems[0].contains("not found"));
    }

    #[test]
    fn test_integrity_failure_converts_to_error() {
        let now = Utc::now();
        let order = Order::place(
            domain::NewOrder {
                order_number: domain::OrderNumber::generate(now),
                customer: domain::Customer::Guest {
                    email: "g@example.com".into(),
                },
                items: vec![],
                shipping_address: domain::Address::default(),
                billing_address: domain::Address::default(),
                subtotal: Money::zero(),
                shipping: Money::zero(),
                tax: Money::zero(),
                total: Money::zero(),
                payment_reference: "PAY-x".into(),
            },
            now,
            chrono::Duration::minutes(15),
        );
        let confirmation = Confirmation {
            order,
            outcome: DeductionOutcome::IntegrityFailure {
                reason: "out of stock".into(),
            },
        };
        assert!(matches!(
            confirmation.into_result(),
            Err(EngineError::DeductionIntegrity { .. })
        ));
    }
}
