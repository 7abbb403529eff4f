use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{Order, OrderNumber, Product};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{CommerceStore, Result, StoreError, StoreTransaction};

/// PostgreSQL-backed store.
///
/// Products and orders are stored as JSONB documents, one row per product so
/// a variant's stock fields are saved atomically with the rest of the product.
/// Orders additionally carry the columns the reaper and webhook lookups filter on.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn ids_as_strings(ids: &[ProductId]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn row_to_product(row: PgRow) -> Result<Product> {
    let Json(product): Json<Product> = row.try_get("document")?;
    Ok(product)
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let Json(order): Json<Order> = row.try_get("document")?;
    Ok(order)
}

#[async_trait]
impl CommerceStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT document FROM products WHERE id = ANY($1) ORDER BY id")
            .bind(ids_as_strings(ids))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT document FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_str())
        .bind(Json(product))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_product_if_absent(&self, product: &Product) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, document, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(product.id.as_str())
        .bind(Json(product))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT document FROM orders WHERE payment_reference = $1 OR transaction_reference = $1 LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OrderId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE payment_status = 'Pending'
              AND reservation_released_at IS NULL
              AND reservation_expires_at < $1
            ORDER BY reservation_expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        ids.iter()
            .map(|id| {
                OrderId::parse(id).map_err(|e| {
                    StoreError::Serialization(serde_json::Error::io(std::io::Error::other(
                        e.to_string(),
                    )))
                })
            })
            .collect()
    }
}

/// Transaction over a [`PostgresStore`]. Reads take `FOR UPDATE` row locks.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn find_products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        // Lock in id order so concurrent checkouts cannot deadlock.
        let rows = sqlx::query(
            "SELECT document FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids_as_strings(ids))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query("UPDATE products SET document = $2, updated_at = NOW() WHERE id = $1")
            .bind(product.id.as_str())
            .bind(Json(product))
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                .bind(number.as_str())
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(exists)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, payment_reference, transaction_reference, payment_status,
                reservation_expires_at, reservation_released_at, document, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.order_number.as_str())
        .bind(&order.payment.reference)
        .bind(order.payment.transaction_reference.as_deref())
        .bind(order.payment.status.as_str())
        .bind(order.inventory.reservation_expires_at)
        .bind(order.inventory.reservation_released_at)
        .bind(Json(order))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_order(&mut self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn find_order_by_payment_reference(&mut self, reference: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT document FROM orders
            WHERE payment_reference = $1 OR transaction_reference = $1
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                transaction_reference = $2,
                payment_status = $3,
                reservation_expires_at = $4,
                reservation_released_at = $5,
                document = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.payment.transaction_reference.as_deref())
        .bind(order.payment.status.as_str())
        .bind(order.inventory.reservation_expires_at)
        .bind(order.inventory.reservation_released_at)
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
