use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{Order, OrderNumber, Product};

use crate::Result;

/// Core trait for catalog and order persistence.
///
/// Methods on the store itself are plain reads (and seeding writes) outside
/// any transaction. Everything that mutates stock goes through
/// [`CommerceStore::begin`].
///
/// Do not call the store's own methods while holding one of its transactions
/// on the same task; backends may serialize transactions against those reads.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    type Tx: StoreTransaction;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Fetches the given products. Unknown ids are skipped.
    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Returns every product in the catalog.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Inserts or replaces a product.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Inserts a product unless one with the same id exists. Returns true if inserted.
    async fn insert_product_if_absent(&self, product: &Product) -> Result<bool>;

    /// Loads an order by id.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Loads an order by its payment reference or gateway transaction reference.
    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>>;

    /// Ids of unpaid orders whose live reservation expired before `now`,
    /// oldest expiry first.
    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderId>>;
}

/// A unit of work over the store.
///
/// Rows read through the transaction stay locked until it ends, so the
/// read-validate-write sequence cannot lose a concurrent update. Dropping the
/// transaction without calling [`StoreTransaction::commit`] rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fetches and locks the given products. Unknown ids are skipped.
    async fn find_products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Writes a product document.
    async fn save_product(&mut self, product: &Product) -> Result<()>;

    /// Returns true if an order already uses this number.
    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool>;

    /// Inserts a new order.
    ///
    /// Fails with `ConcurrencyConflict` if the order number or payment
    /// reference is already taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Fetches and locks an order by id.
    async fn get_order(&mut self, id: &OrderId) -> Result<Option<Order>>;

    /// Fetches and locks an order by payment or transaction reference.
    async fn find_order_by_payment_reference(&mut self, reference: &str) -> Result<Option<Order>>;

    /// Writes an existing order.
    async fn save_order(&mut self, order: &Order) -> Result<()>;

    /// Makes every write in the transaction visible atomically.
    async fn commit(self) -> Result<()>;
}

/// Extension trait providing convenience methods for transactions.
#[async_trait]
pub trait StoreTransactionExt: StoreTransaction {
    /// Fetches and locks products, keyed by id.
    async fn products_by_id(&mut self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let products = self.find_products_by_ids(ids).await?;
        Ok(products.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// Writes every product in the map.
    async fn save_products(&mut self, products: &HashMap<ProductId, Product>) -> Result<()> {
        for product in products.values() {
            self.save_product(product).await?;
        }
        Ok(())
    }
}

// Blanket implementation for all StoreTransaction implementations
impl<T: StoreTransaction + ?Sized> StoreTransactionExt for T {}
