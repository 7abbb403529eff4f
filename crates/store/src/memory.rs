use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{Order, OrderNumber, PaymentStatus, Product};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{CommerceStore, Result, StoreError, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
}

impl MemoryState {
    fn products_by_ids(&self, ids: &[ProductId]) -> Vec<Product> {
        ids.iter()
            .filter_map(|id| self.products.get(id))
            .cloned()
            .collect()
    }

    fn order_by_reference(&self, reference: &str) -> Option<Order> {
        self.orders
            .values()
            .find(|o| o.payment.matches(reference))
            .cloned()
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Transactions are fully serialized: a transaction holds the store lock from
/// [`CommerceStore::begin`] until it is committed or dropped, and works on a
/// private copy of the state that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = MemoryState {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            orders: BTreeMap::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            fail_on_commit: Arc::default(),
        }
    }

    /// Configures commits to fail, simulating an unavailable backend.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Returns a product by id.
    pub async fn product(&self, id: &ProductId) -> Option<Product> {
        self.state.lock().await.products.get(id).cloned()
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        })
    }

    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        Ok(self.state.lock().await.products_by_ids(ids))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.state.lock().await.products.values().cloned().collect())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn insert_product_if_absent(&self, product: &Product) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&product.id) {
            return Ok(false);
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(true)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        Ok(self.state.lock().await.order_by_reference(reference))
    }

    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let state = self.state.lock().await;
        let mut expired: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| o.payment.status == PaymentStatus::Pending && o.is_reservation_expired(now))
            .collect();
        expired.sort_by_key(|o| o.inventory.reservation_expires_at);
        Ok(expired.into_iter().take(limit).map(|o| o.id.clone()).collect())
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_on_commit: bool,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find_products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        Ok(self.working.products_by_ids(ids))
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        self.working
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        Ok(self
            .working
            .orders
            .values()
            .any(|o| &o.order_number == number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::ConcurrencyConflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        if self.order_number_exists(&order.order_number).await? {
            return Err(StoreError::ConcurrencyConflict(format!(
                "order number {} already taken",
                order.order_number
            )));
        }
        if self
            .working
            .order_by_reference(&order.payment.reference)
            .is_some()
        {
            return Err(StoreError::ConcurrencyConflict(format!(
                "payment reference {} already taken",
                order.payment.reference
            )));
        }
        self.working.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(id).cloned())
    }

    async fn find_order_by_payment_reference(&mut self, reference: &str) -> Result<Option<Order>> {
        Ok(self.working.order_by_reference(reference))
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        if self.fail_on_commit {
            tracing::warn!("in-memory commit rejected, discarding transaction");
            return Err(StoreError::Unavailable(
                "commit rejected by in-memory store".to_string(),
            ));
        }
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::VariantId;
    use domain::{Address, Customer, Money, NewOrder, Size, Variant};

    use super::*;

    fn product(quantity: u32) -> Product {
        Product::new(ProductId::new(), "Kaftan", "kaftan", "Linen kaftan", "Menswear").with_variant(
            Variant::new(VariantId::new(), "White", Size::Large, Money::from_units(50), quantity)
                .with_image("k.jpg"),
        )
    }

    fn order(now: DateTime<Utc>, ttl: Duration) -> Order {
        Order::place(
            NewOrder {
                order_number: OrderNumber::generate(now),
                customer: Customer::Guest {
                    email: "g@example.com".to_string(),
                },
                items: vec![],
                shipping_address: Address::default(),
                billing_address: Address::default(),
                subtotal: Money::zero(),
                shipping: Money::zero(),
                tax: Money::zero(),
                total: Money::zero(),
                payment_reference: domain::new_payment_reference(),
            },
            now,
            ttl,
        )
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let p = product(5);
        let store = InMemoryStore::with_products([p.clone()]);

        let mut tx = store.begin().await.unwrap();
        let mut loaded = tx.find_products_by_ids(&[p.id.clone()]).await.unwrap();
        loaded[0].variants[0].hold(2).unwrap();
        tx.save_product(&loaded[0]).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.product(&p.id).await.unwrap();
        assert_eq!(stored.variants[0].reserved_quantity(), 2);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let p = product(5);
        let store = InMemoryStore::with_products([p.clone()]);

        {
            let mut tx = store.begin().await.unwrap();
            let mut loaded = tx.find_products_by_ids(&[p.id.clone()]).await.unwrap();
            loaded[0].variants[0].hold(2).unwrap();
            tx.save_product(&loaded[0]).await.unwrap();
        }

        let stored = store.product(&p.id).await.unwrap();
        assert_eq!(stored.variants[0].reserved_quantity(), 0);
    }

    #[tokio::test]
    async fn failed_commit_discards_writes() {
        let store = InMemoryStore::new();
        store.set_fail_on_commit(true);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order(Utc::now(), Duration::minutes(15)))
            .await
            .unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_order_number() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let first = order(now, Duration::minutes(15));
        let mut second = order(now, Duration::minutes(15));
        second.order_number = first.order_number.clone();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&first).await.unwrap();
        assert!(tx.order_number_exists(&first.order_number).await.unwrap());
        let err = tx.insert_order(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict(_)));
    }

    #[tokio::test]
    async fn lookup_by_either_payment_reference() {
        let store = InMemoryStore::new();
        let mut o = order(Utc::now(), Duration::minutes(15));
        o.payment.transaction_reference = Some("TX-9".to_string());

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&o).await.unwrap();
        tx.commit().await.unwrap();

        let by_ref = store
            .find_order_by_payment_reference(&o.payment.reference)
            .await
            .unwrap();
        let by_tx = store.find_order_by_payment_reference("TX-9").await.unwrap();
        assert_eq!(by_ref.map(|o| o.id), Some(o.id.clone()));
        assert_eq!(by_tx.map(|o| o.id), Some(o.id));
    }

    #[tokio::test]
    async fn expired_reservations_are_pending_and_ordered() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let older = order(now - Duration::minutes(40), Duration::minutes(15));
        let newer = order(now - Duration::minutes(20), Duration::minutes(15));
        let live = order(now, Duration::minutes(15));
        let mut paid = order(now - Duration::minutes(40), Duration::minutes(15));
        paid.record_payment(None, now);

        let mut tx = store.begin().await.unwrap();
        for o in [&newer, &live, &older, &paid] {
            tx.insert_order(o).await.unwrap();
        }
        tx.commit().await.unwrap();

        let expired = store.find_expired_reservations(now, 10).await.unwrap();
        assert_eq!(expired, vec![older.id.clone(), newer.id.clone()]);

        let limited = store.find_expired_reservations(now, 1).await.unwrap();
        assert_eq!(limited, vec![older.id]);
    }

    #[tokio::test]
    async fn transactions_are_serialized() {
        let p = product(1);
        let store = InMemoryStore::with_products([p.clone()]);

        let tx = store.begin().await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.begin().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(tx);
        contender.await.unwrap().unwrap();
    }
}
