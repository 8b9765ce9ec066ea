//! # Activity Repository
//!
//! Source-of-truth rows the reconciliation engine reads: product deliveries,
//! expenses, and stock lots held by employees.
//!
//! Deliveries and expenses are append-only here; their review/payment flows
//! live outside this module. Stock lots are upserts keyed by
//! `(employee_id, product_id)`, and their valuation is never stored: it joins
//! against the product's current unit price at query time.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::validation::validate_id;
use tally_core::{
    value_lot, Expense, ExpenseStatus, Money, PaymentStatus, ProductDelivery, ProductInHand,
};

// =============================================================================
// Inputs
// =============================================================================

/// Input for recording a product delivery.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub employee_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub total_amount_cents: i64,
    pub payment_status: PaymentStatus,
    pub delivered_at: DateTime<Utc>,
}

/// Input for recording an expense.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub employee_id: String,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub status: ExpenseStatus,
    pub incurred_at: DateTime<Utc>,
}

/// Joined lot row; valued into [`ProductInHand`] before leaving this module.
#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    product_id: String,
    product_name: String,
    product_sku: String,
    quantity: i64,
    unit_price_cents: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for delivery, expense, and stock-lot sources.
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pool: SqlitePool,
}

impl ActivityRepository {
    /// Creates a new ActivityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActivityRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Deliveries
    // -------------------------------------------------------------------------

    /// Records a product delivery.
    pub async fn record_delivery(&self, input: &NewDelivery) -> DbResult<ProductDelivery> {
        validate_id("employee_id", &input.employee_id)?;

        debug!(employee_id = %input.employee_id, product_id = %input.product_id, "Recording delivery");

        let delivery = ProductDelivery {
            id: Uuid::new_v4().to_string(),
            employee_id: input.employee_id.clone(),
            product_id: input.product_id.clone(),
            quantity: input.quantity,
            total_amount_cents: input.total_amount_cents,
            payment_status: input.payment_status,
            delivered_at: input.delivered_at,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO product_deliveries
                (id, employee_id, product_id, quantity, total_amount_cents,
                 payment_status, delivered_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&delivery.id)
        .bind(&delivery.employee_id)
        .bind(&delivery.product_id)
        .bind(delivery.quantity)
        .bind(delivery.total_amount_cents)
        .bind(delivery.payment_status)
        .bind(delivery.delivered_at)
        .bind(delivery.created_at)
        .execute(&self.pool)
        .await?;

        Ok(delivery)
    }

    /// All deliveries for an employee, newest first. `limit` of `None` means
    /// the full history (the reconciliation sums need every row).
    pub async fn deliveries_for_employee(
        &self,
        employee_id: &str,
        limit: Option<i64>,
    ) -> DbResult<Vec<ProductDelivery>> {
        let deliveries = sqlx::query_as::<_, ProductDelivery>(
            r#"
            SELECT id, employee_id, product_id, quantity, total_amount_cents,
                   payment_status, delivered_at, created_at
            FROM product_deliveries
            WHERE employee_id = ?1
            ORDER BY delivered_at DESC, created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(employee_id)
        .bind(limit.unwrap_or(-1)) // SQLite: negative LIMIT = no limit
        .fetch_all(&self.pool)
        .await?;

        Ok(deliveries)
    }

    /// Marks a delivery as paid (removes it from market dues).
    pub async fn mark_delivery_paid(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE product_deliveries SET payment_status = 'paid' WHERE id = ?1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Delivery", id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Expenses
    // -------------------------------------------------------------------------

    /// Records an expense.
    pub async fn record_expense(&self, input: &NewExpense) -> DbResult<Expense> {
        validate_id("employee_id", &input.employee_id)?;
        validate_id("category", &input.category)?;

        debug!(employee_id = %input.employee_id, category = %input.category, "Recording expense");

        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            employee_id: input.employee_id.clone(),
            category: input.category.clone(),
            description: input.description.clone(),
            amount_cents: input.amount_cents,
            status: input.status,
            incurred_at: input.incurred_at,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO expenses
                (id, employee_id, category, description, amount_cents,
                 status, incurred_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.employee_id)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.status)
        .bind(expense.incurred_at)
        .bind(expense.created_at)
        .execute(&self.pool)
        .await?;

        Ok(expense)
    }

    /// All expenses for an employee, newest first. `limit` as in
    /// [`ActivityRepository::deliveries_for_employee`].
    pub async fn expenses_for_employee(
        &self,
        employee_id: &str,
        limit: Option<i64>,
    ) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, employee_id, category, description, amount_cents,
                   status, incurred_at, created_at
            FROM expenses
            WHERE employee_id = ?1
            ORDER BY incurred_at DESC, created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(employee_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses)
    }

    /// Sets an expense's review status.
    pub async fn set_expense_status(&self, id: &str, status: ExpenseStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE expenses SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Expense", id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stock lots
    // -------------------------------------------------------------------------

    /// Sets the quantity an employee holds for a product (upsert).
    pub async fn set_stock_lot(
        &self,
        employee_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<()> {
        validate_id("employee_id", employee_id)?;

        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", product_id));
        }

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO stock_lots (id, employee_id, product_id, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT (employee_id, product_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(employee_id)
        .bind(product_id)
        .bind(quantity.max(0))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The employee's held stock, valued at current unit prices.
    ///
    /// Valuation happens here, at read time. An approved adjustment that
    /// changes a product's price or quantity is reflected on the very next
    /// call; nothing is cached.
    pub async fn lots_for_employee(&self, employee_id: &str) -> DbResult<Vec<ProductInHand>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT l.product_id,
                   p.name AS product_name,
                   p.sku AS product_sku,
                   l.quantity,
                   p.unit_price_cents
            FROM stock_lots l
            INNER JOIN products p ON p.id = l.product_id
            WHERE l.employee_id = ?1 AND l.quantity > 0
            ORDER BY p.name
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let total = value_lot(row.quantity, Money::from_cents(row.unit_price_cents));
                ProductInHand {
                    product_id: row.product_id,
                    product_name: row.product_name,
                    product_sku: row.product_sku,
                    quantity: row.quantity,
                    unit_price_cents: row.unit_price_cents,
                    total_value_cents: total.cents(),
                }
            })
            .collect())
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

    fn delivery(employee_id: &str, product_id: &str, cents: i64) -> NewDelivery {
        NewDelivery {
            employee_id: employee_id.to_string(),
            product_id: product_id.to_string(),
            quantity: 1,
            total_amount_cents: cents,
            payment_status: PaymentStatus::Pending,
            delivered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_record_and_list_deliveries() {
        let db = test_db().await;
        let product = db.products().create("WID-1", "Widget", 1_000, 10).await.unwrap();
        let repo = db.activity();

        repo.record_delivery(&delivery("emp-1", &product.id, 50_000)).await.unwrap();
        repo.record_delivery(&delivery("emp-1", &product.id, 30_000)).await.unwrap();
        repo.record_delivery(&delivery("emp-2", &product.id, 70_000)).await.unwrap();

        let all = repo.deliveries_for_employee("emp-1", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let limited = repo.deliveries_for_employee("emp-1", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_delivery_paid() {
        let db = test_db().await;
        let product = db.products().create("WID-1", "Widget", 1_000, 10).await.unwrap();
        let repo = db.activity();

        let recorded = repo.record_delivery(&delivery("emp-1", &product.id, 50_000)).await.unwrap();
        assert_eq!(recorded.payment_status, PaymentStatus::Pending);

        repo.mark_delivery_paid(&recorded.id).await.unwrap();
        let listed = repo.deliveries_for_employee("emp-1", None).await.unwrap();
        assert_eq!(listed[0].payment_status, PaymentStatus::Paid);

        let err = repo.mark_delivery_paid("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_record_expense_and_set_status() {
        let db = test_db().await;
        let repo = db.activity();

        let expense = repo
            .record_expense(&NewExpense {
                employee_id: "emp-1".to_string(),
                category: "fuel".to_string(),
                description: Some("weekly run".to_string()),
                amount_cents: 2_500,
                status: ExpenseStatus::Pending,
                incurred_at: Utc::now(),
            })
            .await
            .unwrap();

        repo.set_expense_status(&expense.id, ExpenseStatus::Approved).await.unwrap();
        let listed = repo.expenses_for_employee("emp-1", None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ExpenseStatus::Approved);
    }

    #[tokio::test]
    async fn test_stock_lot_upsert_and_valuation() {
        let db = test_db().await;
        let product = db.products().create("WID-1", "Widget", 1_000, 10).await.unwrap();
        let repo = db.activity();

        repo.set_stock_lot("emp-1", &product.id, 3).await.unwrap();
        let lots = repo.lots_for_employee("emp-1").await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].quantity, 3);
        assert_eq!(lots[0].total_value_cents, 3_000);

        // Upsert replaces, never duplicates.
        repo.set_stock_lot("emp-1", &product.id, 5).await.unwrap();
        let lots = repo.lots_for_employee("emp-1").await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].quantity, 5);

        // Valuation follows the current unit price.
        db.products()
            .update_details(&product.id, "WID-1", "Widget", 2_000)
            .await
            .unwrap();
        let lots = repo.lots_for_employee("emp-1").await.unwrap();
        assert_eq!(lots[0].total_value_cents, 10_000);

        // Zeroed lots disappear from the view.
        repo.set_stock_lot("emp-1", &product.id, 0).await.unwrap();
        assert!(repo.lots_for_employee("emp-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stock_lot_unknown_product() {
        let db = test_db().await;
        let err = db.activity().set_stock_lot("emp-1", "nope", 3).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
