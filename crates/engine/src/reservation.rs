//! Stock holds placed at checkout and released on expiry or failed payment.

use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{Order, OrderItem, aggregate_quantities};
use store::{StoreTransaction, StoreTransactionExt};

use crate::error::{EngineError, Result, capped};

/// Places and releases variant holds inside a caller-owned transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationManager;

impl ReservationManager {
    pub fn new() -> Self {
        Self
    }

    /// Holds stock for every item, or for none of them.
    ///
    /// Quantities are summed per variant first, then every variant is checked
    /// against `quantity - reserved_quantity` before any is touched.
    #[tracing::instrument(skip(self, tx, items), fields(lines = items.len()))]
    pub async fn reserve<T>(&self, tx: &mut T, items: &[OrderItem]) -> Result<()>
    where
        T: StoreTransaction,
    {
        let required =
            aggregate_quantities(items).map_err(|e| EngineError::Validation(e.to_string()))?;
        let ids: Vec<ProductId> = required.keys().cloned().collect();
        let mut products = tx.products_by_id(&ids).await?;

        let mut problems = Vec::new();
        for (product_id, variants) in &required {
            let Some(product) = products.get(product_id) else {
                problems.push(format!("Product {product_id} not found"));
                continue;
            };
            for (variant_id, quantity) in variants {
                match product.variant(variant_id) {
                    None => problems.push(format!(
                        "Variant {variant_id} of {} not found",
                        product.name
                    )),
                    Some(variant) if variant.available() < *quantity => {
                        problems.push(format!(
                            "Insufficient stock for {} ({} / {}): requested {quantity}, available {}",
                            product.name,
                            variant.color,
                            variant.size,
                            variant.available()
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        if !problems.is_empty() {
            metrics::counter!("reservation_failures_total").increment(1);
            tracing::info!(?problems, "reservation rejected");
            return Err(EngineError::InsufficientStock(capped(problems)));
        }

        for (product_id, variants) in &required {
            if let Some(product) = products.get_mut(product_id) {
                for (variant_id, quantity) in variants {
                    if let Some(variant) = product.variant_mut(variant_id) {
                        variant.hold(*quantity)?;
                    }
                }
            }
        }
        tx.save_products(&products).await?;

        metrics::counter!("reservations_total").increment(1);
        Ok(())
    }

    /// Returns an order's live hold to the available pool and stamps it released.
    ///
    /// Missing products or variants and holds smaller than the order's
    /// quantities are logged and clamped rather than failing the release.
    /// Returns false if the order had no live hold.
    #[tracing::instrument(skip(self, tx, order), fields(order_number = %order.order_number))]
    pub async fn release<T>(
        &self,
        tx: &mut T,
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<bool>
    where
        T: StoreTransaction,
    {
        if !order.has_live_reservation() {
            return Ok(false);
        }

        let required = order.required_quantities()?;
        let ids: Vec<ProductId> = required.keys().cloned().collect();
        let mut products = tx.products_by_id(&ids).await?;

        for (product_id, variants) in &required {
            let Some(product) = products.get_mut(product_id) else {
                tracing::warn!(%product_id, "releasing hold for a product that no longer exists");
                continue;
            };
            for (variant_id, quantity) in variants {
                let Some(variant) = product.variant_mut(variant_id) else {
                    tracing::warn!(
                        %product_id,
                        %variant_id,
                        "releasing hold for a variant that no longer exists"
                    );
                    continue;
                };
                if variant.reserved_quantity() < *quantity {
                    tracing::warn!(
                        %product_id,
                        %variant_id,
                        reserved = variant.reserved_quantity(),
                        quantity,
                        "hold smaller than order quantity, clamping"
                    );
                }
                variant.release_hold(*quantity);
            }
        }
        tx.save_products(&products).await?;
        order.mark_reservation_released(now);

        metrics::counter!("reservations_released_total").increment(1);
        tracing::info!("reservation released");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::VariantId;
    use domain::{Address, Customer, Money, NewOrder, OrderNumber, Product, Size, Variant};
    use store::{CommerceStore, InMemoryStore};

    use super::*;

    fn product(name: &str, quantity: u32) -> Product {
        Product::new(ProductId::new(), name, name.to_lowercase(), "Handmade", "Menswear")
            .with_variant(
                Variant::new(
                    VariantId::new(),
                    "Indigo",
                    Size::Large,
                    Money::from_units(20),
                    quantity,
                )
                .with_image("x.jpg"),
            )
    }

    fn item(product: &Product, quantity: u32) -> OrderItem {
        let variant = &product.variants[0];
        OrderItem {
            product_id: product.id.clone(),
            variant_id: variant.id.clone(),
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
            color: variant.color.clone(),
            size: variant.size,
            image: None,
            unit_price: variant.price,
            discount_price: variant.discount_price,
            effective_price: variant.price,
            quantity,
            item_subtotal: variant.price.multiply(quantity),
            item_total: variant.price.multiply(quantity),
        }
    }

    fn order(items: Vec<OrderItem>) -> Order {
        let now = Utc::now();
        Order::place(
            NewOrder {
                order_number: OrderNumber::generate(now),
                customer: Customer::Guest {
                    email: "guest@example.com".to_string(),
                },
                items,
                shipping_address: Address::default(),
                billing_address: Address::default(),
                subtotal: Money::zero(),
                shipping: Money::zero(),
                tax: Money::zero(),
                total: Money::zero(),
                payment_reference: domain::new_payment_reference(),
            },
            now,
            Duration::minutes(15),
        )
    }

    #[tokio::test]
    async fn test_reserve_aggregates_duplicate_lines() {
        let p = product("Dashiki", 5);
        let store = InMemoryStore::with_products([p.clone()]);

        let mut tx = store.begin().await.unwrap();
        ReservationManager::new()
            .reserve(&mut tx, &[item(&p, 2), item(&p, 3)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let variant = &store.product(&p.id).await.unwrap().variants[0];
        assert_eq!(variant.reserved_quantity(), 5);
        assert!(!variant.in_stock());
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_checked_against_their_sum() {
        let p = product("Dashiki", 4);
        let store = InMemoryStore::with_products([p.clone()]);

        let mut tx = store.begin().await.unwrap();
        let err = ReservationManager::new()
            .reserve(&mut tx, &[item(&p, 2), item(&p, 3)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock(_)));
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let plenty = product("Kaftan", 10);
        let short = product("Agbada", 1);
        let store = InMemoryStore::with_products([plenty.clone(), short.clone()]);

        let mut tx = store.begin().await.unwrap();
        let err = ReservationManager::new()
            .reserve(&mut tx, &[item(&plenty, 2), item(&short, 2)])
            .await
            .unwrap_err();
        match err {
            EngineError::InsufficientStock(messages) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("Agbada"));
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(tx);

        let untouched = store.product(&plenty.id).await.unwrap();
        assert_eq!(untouched.variants[0].reserved_quantity(), 0);
    }

    #[tokio::test]
    async fn test_reserve_rejects_quantities_that_overflow() {
        let p = product("Dashiki", 5);
        let store = InMemoryStore::with_products([p.clone()]);

        let mut tx = store.begin().await.unwrap();
        let err = ReservationManager::new()
            .reserve(&mut tx, &[item(&p, 1 << 31), item(&p, 1 << 31)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        drop(tx);

        assert_eq!(store.product(&p.id).await.unwrap().variants[0].reserved_quantity(), 0);
    }

    #[tokio::test]
    async fn test_reserve_reports_missing_product() {
        let ghost = product("Ghost", 1);
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        let err = ReservationManager::new()
            .reserve(&mut tx, &[item(&ghost, 1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_clamps() {
        let p = product("Kaftan", 5);
        let store = InMemoryStore::with_products([p.clone()]);
        let manager = ReservationManager::new();
        let mut o = order(vec![item(&p, 3)]);

        let mut tx = store.begin().await.unwrap();
        manager.reserve(&mut tx, &o.items).await.unwrap();
        tx.commit().await.unwrap();

        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        assert!(manager.release(&mut tx, &mut o, now).await.unwrap());
        assert!(!manager.release(&mut tx, &mut o, now).await.unwrap());
        tx.commit().await.unwrap();

        let variant = &store.product(&p.id).await.unwrap().variants[0];
        assert_eq!(variant.reserved_quantity(), 0);
        assert_eq!(variant.quantity(), 5);
        assert_eq!(o.inventory.reservation_released_at, Some(now));

        // A second order whose hold was never placed only clamps at zero.
        let mut stray = order(vec![item(&p, 2)]);
        let mut tx = store.begin().await.unwrap();
        assert!(manager.release(&mut tx, &mut stray, now).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.product(&p.id).await.unwrap().variants[0].reserved_quantity(), 0);
    }
}
