//! # Product Repository (the Product Store)
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - CRUD operations
//! - Guarded stock writes
//!
//! ## Stock Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Conditional Stock Update                                │
//! │                                                                         │
//! │  ❌ WRONG: check-then-act without a guard                               │
//! │     SELECT stock_quantity  → compute → UPDATE ... SET stock_quantity=N  │
//! │     (a concurrent approval between the SELECT and UPDATE is lost)       │
//! │                                                                         │
//! │  ✅ CORRECT: compare-and-swap on the observed value                     │
//! │     UPDATE products SET stock_quantity = N                              │
//! │     WHERE id = ? AND stock_quantity = <observed>                        │
//! │     → 0 rows affected = lost the race → re-read and retry (bounded)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::WriteTx;
use tally_core::validation::{validate_product_name, validate_sku};
use tally_core::Product;

/// Bounded retries for the optimistic stock write.
const MAX_STOCK_WRITE_ATTEMPTS: u32 = 3;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, unit_price_cents, stock_quantity, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID, or a NotFound error.
    pub async fn get_required(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, unit_price_cents, stock_quantity, created_at, updated_at
            FROM products
            WHERE sku = ?1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products ordered by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, unit_price_cents, stock_quantity, created_at, updated_at
            FROM products
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Creates a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn create(
        &self,
        sku: &str,
        name: &str,
        unit_price_cents: i64,
        stock_quantity: i64,
    ) -> DbResult<Product> {
        validate_sku(sku)?;
        validate_product_name(name)?;

        debug!(sku = %sku, "Inserting product");

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            unit_price_cents,
            stock_quantity: stock_quantity.max(0),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, unit_price_cents, stock_quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_price_cents)
        .bind(product.stock_quantity)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Updates a product's descriptive fields and unit price.
    ///
    /// Deliberately does NOT touch `stock_quantity`; quantity changes go
    /// through [`ProductRepository::apply_stock_delta`] or the adjustment
    /// approval flow.
    pub async fn update_details(
        &self,
        id: &str,
        sku: &str,
        name: &str,
        unit_price_cents: i64,
    ) -> DbResult<()> {
        validate_sku(sku)?;
        validate_product_name(name)?;

        debug!(id = %id, "Updating product details");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                name = ?3,
                unit_price_cents = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(sku.trim())
        .bind(name.trim())
        .bind(unit_price_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Atomically applies a signed delta to a product's stock, clamped at
    /// zero, and returns the resulting quantity.
    ///
    /// Runs in an immediate write transaction (see [`WriteTx`]), so
    /// concurrent writers queue on the lock rather than aborting. The UPDATE
    /// stays conditional on the observed quantity, and a lost race or a busy
    /// timeout is retried with a fresh read a bounded number of times before
    /// surfacing `ConcurrencyConflict`.
    pub async fn apply_stock_delta(&self, id: &str, delta: i64) -> DbResult<i64> {
        debug!(id = %id, delta = %delta, "Applying stock delta");

        for _attempt in 0..MAX_STOCK_WRITE_ATTEMPTS {
            match self.try_apply_stock_delta(id, delta).await {
                Ok(Some(quantity)) => return Ok(quantity),
                Ok(None) => continue,
                Err(err) if err.is_busy() => continue,
                Err(err) => return Err(err),
            }
        }

        Err(DbError::ConcurrencyConflict {
            message: format!(
                "stock write for product {} lost {} consecutive races",
                id, MAX_STOCK_WRITE_ATTEMPTS
            ),
        })
    }

    /// One guarded write attempt. `Ok(None)` means the conditional update
    /// matched nothing and the caller should retry from a fresh read.
    async fn try_apply_stock_delta(&self, id: &str, delta: i64) -> DbResult<Option<i64>> {
        let mut tx = WriteTx::begin(&self.pool).await?;

        let observed: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(tx.conn()?)
                .await?;

        let Some(observed) = observed else {
            return Err(DbError::not_found("Product", id));
        };

        let target = (observed + delta).max(0);
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = ?2, updated_at = ?3
            WHERE id = ?1 AND stock_quantity = ?4
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(now)
        .bind(observed)
        .execute(tx.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(target))
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let db = test_db().await;
        let repo = db.products();

        let created = repo.create("WID-1", "Widget", 1_000, 50).await.unwrap();
        let fetched = repo.get_required(&created.id).await.unwrap();

        assert_eq!(fetched.sku, "WID-1");
        assert_eq!(fetched.stock_quantity, 50);
        assert_eq!(fetched.unit_price_cents, 1_000);

        let by_sku = repo.get_by_sku("WID-1").await.unwrap().unwrap();
        assert_eq!(by_sku.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = test_db().await;
        let repo = db.products();

        repo.create("WID-1", "Widget", 1_000, 0).await.unwrap();
        let err = repo.create("WID-1", "Widget Two", 2_000, 0).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let db = test_db().await;
        let repo = db.products();

        assert!(matches!(
            repo.create("", "Widget", 1_000, 0).await.unwrap_err(),
            DbError::Validation(_)
        ));
        assert!(matches!(
            repo.create("WID-1", "", 1_000, 0).await.unwrap_err(),
            DbError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_apply_stock_delta() {
        let db = test_db().await;
        let repo = db.products();

        let product = repo.create("WID-1", "Widget", 1_000, 10).await.unwrap();

        assert_eq!(repo.apply_stock_delta(&product.id, 5).await.unwrap(), 15);
        assert_eq!(repo.apply_stock_delta(&product.id, -3).await.unwrap(), 12);

        // Clamped at zero, never negative.
        assert_eq!(repo.apply_stock_delta(&product.id, -100).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stock_deltas_on_file_backed_db() {
        // Multi-connection pool on a real file: writers must queue and apply
        // every delta, never abort with an opaque lock error.
        let path = std::env::temp_dir().join(format!("tally-delta-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let repo = db.products();

        let product = repo.create("WID-1", "Widget", 1_000, 0).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            let id = product.id.clone();
            handles.push(tokio::spawn(async move {
                repo.apply_stock_delta(&id, 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let fetched = repo.get_required(&product.id).await.unwrap();
        assert_eq!(fetched.stock_quantity, 10);

        db.close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn test_apply_stock_delta_missing_product() {
        let db = test_db().await;
        let err = db.products().apply_stock_delta("nope", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_details_leaves_stock_alone() {
        let db = test_db().await;
        let repo = db.products();

        let product = repo.create("WID-1", "Widget", 1_000, 7).await.unwrap();
        repo.update_details(&product.id, "WID-1", "Widget Mk2", 1_500)
            .await
            .unwrap();

        let fetched = repo.get_required(&product.id).await.unwrap();
        assert_eq!(fetched.name, "Widget Mk2");
        assert_eq!(fetched.unit_price_cents, 1_500);
        assert_eq!(fetched.stock_quantity, 7);
    }
}
