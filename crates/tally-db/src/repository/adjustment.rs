//! # Adjustment Ledger Repository
//!
//! Owns the lifecycle of stock-adjustment proposals.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Adjustment Ledger Workflow                            │
//! │                                                                         │
//! │  1. PROPOSE                                                             │
//! │     └── propose() → StockAdjustment { status: pending }                 │
//! │         reference number assigned from a date-prefixed, storage-backed  │
//! │         sequence (retried on collision)                                 │
//! │                                                                         │
//! │  2. REVIEW (exactly one decision ever wins)                             │
//! │     ├── approve() → status: approved, stock mutated, quantities frozen  │
//! │     └── reject()  → status: rejected, stock untouched                   │
//! │                                                                         │
//! │  3. WHILE PENDING ONLY                                                  │
//! │     ├── edit()    → re-validated, reference number kept                 │
//! │     └── delete()  → terminal records can never be deleted (audit)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Every transition is a conditional write (`WHERE status = 'pending'`), so a
//! decision is linearizable: retried approvals on an already-approved record
//! cannot re-apply the delta. Multi-statement writes (propose, approve) run
//! in immediate write transactions (see [`WriteTx`]), so concurrent writers
//! queue on SQLite's write lock instead of aborting mid-upgrade; busy
//! timeouts and the guarded product-quantity write are retried with a fresh
//! read, bounded, before surfacing `ConcurrencyConflict`.

use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::WriteTx;
use tally_core::adjustment::{
    apply_adjustment, check_mutable, check_transition, format_reference, reference_day_prefix,
};
use tally_core::validation::{validate_adjustment_patch, validate_new_adjustment};
use tally_core::{
    AdjustmentListItem, AdjustmentPatch, AdjustmentPolicy, AdjustmentReason, AdjustmentStatus,
    AdjustmentType, ApprovalOutcome, CoreError, NewAdjustment, Page, StockAdjustment,
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};

/// Bounded retries for reference-number collisions under concurrent proposes.
const MAX_REFERENCE_ATTEMPTS: u32 = 5;

/// Bounded retries for the conditional product-quantity write.
const MAX_STOCK_WRITE_ATTEMPTS: u32 = 3;

/// Columns of `stock_adjustments`, aliased off `a`, in FromRow order.
const ADJUSTMENT_COLUMNS: &str = "a.id, a.reference_number, a.product_id, a.adjustment_type, \
     a.quantity_adjusted, a.reason, a.status, a.old_quantity, a.new_quantity, a.notes, \
     a.adjustment_date, a.created_by, a.approved_by, a.approved_at, a.created_at, a.updated_at";

// =============================================================================
// Filter
// =============================================================================

/// Filters for listing/exporting adjustments. All fields combine with AND.
#[derive(Debug, Clone)]
pub struct AdjustmentFilter {
    /// Matches reference number, product name, or SKU (substring).
    pub search: Option<String>,
    pub status: Option<AdjustmentStatus>,
    pub adjustment_type: Option<AdjustmentType>,
    pub reason: Option<AdjustmentReason>,
    pub product_id: Option<String>,
    /// Inclusive lower bound on `adjustment_date`.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `adjustment_date`.
    pub date_to: Option<NaiveDate>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AdjustmentFilter {
    fn default() -> Self {
        AdjustmentFilter {
            search: None,
            status: None,
            adjustment_type: None,
            reason: None,
            product_id: None,
            date_from: None,
            date_to: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Joined listing row. Private; flattened into [`AdjustmentListItem`].
#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    #[sqlx(flatten)]
    adjustment: StockAdjustment,
    product_name: String,
    product_sku: String,
}

impl From<AdjustmentRow> for AdjustmentListItem {
    fn from(row: AdjustmentRow) -> Self {
        let display_delta = row.adjustment.display_delta();
        AdjustmentListItem {
            adjustment: row.adjustment,
            product_name: row.product_name,
            product_sku: row.product_sku,
            display_delta,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the adjustment ledger.
#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
}

impl AdjustmentRepository {
    /// Creates a new AdjustmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AdjustmentRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Propose
    // -------------------------------------------------------------------------

    /// Creates a new pending adjustment.
    ///
    /// Validates the input against the policy, checks the product exists, and
    /// assigns a fresh reference number from the per-day sequence. The
    /// sequence scan and the insert share one immediate write transaction, so
    /// concurrent proposes each see a fresh day-maximum; a busy timeout or a
    /// (theoretical) reference collision retries the attempt rather than
    /// failing the operation.
    ///
    /// No Product Store side effect: stock changes only at approval.
    pub async fn propose(
        &self,
        input: &NewAdjustment,
        policy: &AdjustmentPolicy,
        actor: &str,
    ) -> DbResult<StockAdjustment> {
        validate_new_adjustment(input, policy)?;

        let product_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
                .bind(&input.product_id)
                .fetch_optional(&self.pool)
                .await?;
        if product_exists.is_none() {
            return Err(DbError::not_found("Product", &input.product_id));
        }

        for attempt in 0..MAX_REFERENCE_ATTEMPTS {
            match self.try_propose(input, actor).await {
                Ok(adjustment) => return Ok(adjustment),
                Err(err)
                    if err.is_busy() || err.is_unique_violation_on("reference_number") =>
                {
                    warn!(attempt, "Propose lost a write race, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Err(DbError::ConcurrencyConflict {
            message: format!(
                "could not assign a unique reference number after {} attempts",
                MAX_REFERENCE_ATTEMPTS
            ),
        })
    }

    /// One propose attempt inside an immediate write transaction.
    async fn try_propose(&self, input: &NewAdjustment, actor: &str) -> DbResult<StockAdjustment> {
        let today = Utc::now().date_naive();
        let mut tx = WriteTx::begin(&self.pool).await?;

        let sequence = next_reference_sequence(tx.conn()?, today).await?;
        let reference = format_reference(today, sequence);

        debug!(reference = %reference, product_id = %input.product_id, "Proposing adjustment");

        let now = Utc::now();
        let adjustment = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            reference_number: reference,
            product_id: input.product_id.clone(),
            adjustment_type: input.adjustment_type,
            quantity_adjusted: input.quantity_adjusted,
            reason: input.reason,
            status: AdjustmentStatus::Pending,
            old_quantity: None,
            new_quantity: None,
            notes: input.notes.clone(),
            adjustment_date: input.adjustment_date,
            created_by: actor.to_string(),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (
                id, reference_number, product_id, adjustment_type, quantity_adjusted,
                reason, status, old_quantity, new_quantity, notes,
                adjustment_date, created_by, approved_by, approved_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16
            )
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.reference_number)
        .bind(&adjustment.product_id)
        .bind(adjustment.adjustment_type)
        .bind(adjustment.quantity_adjusted)
        .bind(adjustment.reason)
        .bind(adjustment.status)
        .bind(adjustment.old_quantity)
        .bind(adjustment.new_quantity)
        .bind(&adjustment.notes)
        .bind(adjustment.adjustment_date)
        .bind(&adjustment.created_by)
        .bind(&adjustment.approved_by)
        .bind(adjustment.approved_at)
        .bind(adjustment.created_at)
        .bind(adjustment.updated_at)
        .execute(tx.conn()?)
        .await?;

        tx.commit().await?;
        Ok(adjustment)
    }

    // -------------------------------------------------------------------------
    // Read
    // -------------------------------------------------------------------------

    /// Gets an adjustment by ID, or NotFound.
    pub async fn get(&self, id: &str) -> DbResult<StockAdjustment> {
        let sql = format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments a WHERE a.id = ?1"
        );
        sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Adjustment", id))
    }

    // -------------------------------------------------------------------------
    // Approve
    // -------------------------------------------------------------------------

    /// Approves a pending adjustment, atomically applying the stock delta.
    ///
    /// In a single transaction:
    /// (a) re-reads the product's current quantity as `old_quantity`;
    /// (b) computes `new_quantity` (decreases clamp at zero);
    /// (c) writes the product quantity, conditional on the observed value;
    /// (d) transitions status `pending → approved`, conditional on it still
    ///     being pending, freezing the quantities and stamping the reviewer.
    ///
    /// A lost product-quantity race or a busy timeout retries with a fresh
    /// read, bounded; a lost status race is a `StateConflict` (someone else
    /// decided first) and the delta is NOT applied again.
    pub async fn approve(&self, id: &str, actor: &str) -> DbResult<ApprovalOutcome> {
        for _attempt in 0..MAX_STOCK_WRITE_ATTEMPTS {
            match self.try_approve(id, actor).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => continue,
                Err(err) if err.is_busy() => continue,
                Err(err) => return Err(err),
            }
        }

        Err(DbError::ConcurrencyConflict {
            message: format!(
                "approval of {} lost {} consecutive stock-write races",
                id, MAX_STOCK_WRITE_ATTEMPTS
            ),
        })
    }

    /// One approval attempt inside an immediate write transaction.
    /// `Ok(None)` means the product-quantity write matched nothing and the
    /// caller should retry from a fresh read.
    async fn try_approve(&self, id: &str, actor: &str) -> DbResult<Option<ApprovalOutcome>> {
        let mut tx = WriteTx::begin(&self.pool).await?;

        let sql = format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments a WHERE a.id = ?1"
        );
        let adjustment = sqlx::query_as::<_, StockAdjustment>(&sql)
            .bind(id)
            .fetch_optional(tx.conn()?)
            .await?
            .ok_or_else(|| DbError::not_found("Adjustment", id))?;

        map_state_guard(check_transition(
            id,
            adjustment.status,
            AdjustmentStatus::Approved,
        ))?;

        let old_quantity: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(&adjustment.product_id)
                .fetch_optional(tx.conn()?)
                .await?;
        let Some(old_quantity) = old_quantity else {
            return Err(DbError::not_found("Product", &adjustment.product_id));
        };

        let applied = apply_adjustment(
            adjustment.adjustment_type,
            old_quantity,
            adjustment.quantity_adjusted,
        );
        let now = Utc::now();

        let product_write = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = ?2, updated_at = ?3
            WHERE id = ?1 AND stock_quantity = ?4
            "#,
        )
        .bind(&adjustment.product_id)
        .bind(applied.new_quantity)
        .bind(now)
        .bind(old_quantity)
        .execute(tx.conn()?)
        .await?;

        if product_write.rows_affected() == 0 {
            // Stale read: cannot happen while we hold the write lock, but the
            // guard stays so the discipline holds on any storage backend.
            tx.rollback().await?;
            return Ok(None);
        }

        let status_write = sqlx::query(
            r#"
            UPDATE stock_adjustments SET
                status = 'approved',
                old_quantity = ?2,
                new_quantity = ?3,
                approved_by = ?4,
                approved_at = ?5,
                updated_at = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(old_quantity)
        .bind(applied.new_quantity)
        .bind(actor)
        .bind(now)
        .execute(tx.conn()?)
        .await?;

        if status_write.rows_affected() == 0 {
            // Lost the decision race: exactly one decision may ever win.
            tx.rollback().await?;
            let current = self.get(id).await?;
            return Err(DbError::state_conflict(
                "Adjustment",
                id,
                current.status.to_string(),
            ));
        }

        tx.commit().await?;

        if applied.clamped {
            warn!(
                adjustment_id = %id,
                old_quantity,
                quantity_adjusted = adjustment.quantity_adjusted,
                "Decrease clamped at zero; recorded delta understates the nominal one"
            );
        }
        debug!(adjustment_id = %id, new_quantity = applied.new_quantity, "Adjustment approved");

        let decided = self.get(id).await?;
        Ok(Some(ApprovalOutcome {
            adjustment: decided,
            stock_quantity: applied.new_quantity,
            clamped: applied.clamped,
        }))
    }

    // -------------------------------------------------------------------------
    // Reject
    // -------------------------------------------------------------------------

    /// Rejects a pending adjustment. No Product Store mutation; quantities
    /// stay NULL. The reviewer of the rejection is stamped in `approved_by`.
    pub async fn reject(&self, id: &str, actor: &str) -> DbResult<StockAdjustment> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_adjustments SET
                status = 'rejected',
                approved_by = ?2,
                approved_at = ?3,
                updated_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either missing or already decided; report which.
            let current = self.get(id).await?;
            return Err(DbError::state_conflict(
                "Adjustment",
                id,
                current.status.to_string(),
            ));
        }

        debug!(adjustment_id = %id, "Adjustment rejected");
        self.get(id).await
    }

    // -------------------------------------------------------------------------
    // Edit / Delete (pending only)
    // -------------------------------------------------------------------------

    /// Edits a pending adjustment. Re-validates exactly as `propose` does;
    /// changing `product_id` or `adjustment_type` is allowed while pending.
    /// The reference number is never regenerated.
    pub async fn edit(
        &self,
        id: &str,
        patch: &AdjustmentPatch,
        policy: &AdjustmentPolicy,
        _actor: &str,
    ) -> DbResult<StockAdjustment> {
        validate_adjustment_patch(patch, policy)?;

        let current = self.get(id).await?;
        map_state_guard(check_mutable(id, current.status))?;

        let product_id = patch.product_id.clone().unwrap_or(current.product_id);
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM products WHERE id = ?1")
            .bind(&product_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", &product_id));
        }

        let adjustment_type = patch.adjustment_type.unwrap_or(current.adjustment_type);
        let quantity_adjusted = patch.quantity_adjusted.unwrap_or(current.quantity_adjusted);
        let reason = patch.reason.unwrap_or(current.reason);
        let adjustment_date = patch.adjustment_date.unwrap_or(current.adjustment_date);
        // Outer None = unchanged, Some(None) = clear, Some(Some(_)) = replace.
        let notes = match &patch.notes {
            Some(notes) => notes.clone(),
            None => current.notes,
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_adjustments SET
                product_id = ?2,
                adjustment_type = ?3,
                quantity_adjusted = ?4,
                reason = ?5,
                adjustment_date = ?6,
                notes = ?7,
                updated_at = ?8
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(&product_id)
        .bind(adjustment_type)
        .bind(quantity_adjusted)
        .bind(reason)
        .bind(adjustment_date)
        .bind(&notes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Decided between our read and write.
            let current = self.get(id).await?;
            return Err(DbError::state_conflict(
                "Adjustment",
                id,
                current.status.to_string(),
            ));
        }

        self.get(id).await
    }

    /// Deletes a pending adjustment. Terminal records are kept for audit and
    /// cannot be deleted.
    pub async fn delete(&self, id: &str, _actor: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM stock_adjustments WHERE id = ?1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let current = self.get(id).await?;
            return Err(DbError::state_conflict(
                "Adjustment",
                id,
                current.status.to_string(),
            ));
        }

        debug!(adjustment_id = %id, "Pending adjustment deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // List / Export
    // -------------------------------------------------------------------------

    /// Lists adjustments matching the filter, newest first, with product
    /// summaries and display deltas. Offset-paginated with a total count.
    pub async fn list(&self, filter: &AdjustmentFilter) -> DbResult<Page<AdjustmentListItem>> {
        let limit = filter.limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = filter.offset.max(0);

        let mut count_query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) FROM stock_adjustments a \
             INNER JOIN products p ON p.id = a.product_id WHERE 1 = 1",
        );
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {ADJUSTMENT_COLUMNS}, p.name AS product_name, p.sku AS product_sku \
             FROM stock_adjustments a \
             INNER JOIN products p ON p.id = a.product_id WHERE 1 = 1"
        ));
        push_filters(&mut query, filter);
        query
            .push(" ORDER BY a.created_at DESC, a.reference_number DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<AdjustmentRow> = query.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows.into_iter().map(AdjustmentListItem::from).collect(),
            total,
            limit,
            offset,
        })
    }

    /// Serializes the filtered collection to tabular rows (header included).
    /// The actual file format is a delegated external concern.
    pub async fn export_rows(&self, filter: &AdjustmentFilter) -> DbResult<Vec<Vec<String>>> {
        let page = self.list(filter).await?;

        let mut rows = Vec::with_capacity(page.items.len() + 1);
        rows.push(
            [
                "reference", "sku", "product", "type", "quantity", "reason", "status", "delta",
                "date", "created_by", "decided_by",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );

        for item in page.items {
            let a = &item.adjustment;
            rows.push(vec![
                a.reference_number.clone(),
                item.product_sku.clone(),
                item.product_name.clone(),
                a.adjustment_type.to_string(),
                a.quantity_adjusted.to_string(),
                a.reason.to_string(),
                a.status.to_string(),
                item.display_delta.clone().unwrap_or_default(),
                a.adjustment_date.to_string(),
                a.created_by.clone(),
                a.approved_by.clone().unwrap_or_default(),
            ]);
        }

        Ok(rows)
    }
}

/// Next free sequence for the given day: MAX over existing references + 1.
///
/// Runs on the propose transaction's connection so the scan and the insert
/// are atomic. Storage-backed rather than an in-process counter, so multiple
/// server instances stay collision-free; the UNIQUE index is the final
/// arbiter either way.
async fn next_reference_sequence(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<u32> {
    let prefix = reference_day_prefix(day);
    let pattern = format!("{}%", prefix);
    // substr() is 1-based: the sequence starts right after the prefix.
    let seq_start = (prefix.len() + 1) as i64;

    let max: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(substr(reference_number, ?1) AS INTEGER))
        FROM stock_adjustments
        WHERE reference_number LIKE ?2
        "#,
    )
    .bind(seq_start)
    .bind(&pattern)
    .fetch_one(conn)
    .await?;

    Ok(max.unwrap_or(0) as u32 + 1)
}

/// Appends the filter predicates to a query builder (shared between the
/// listing and count queries so they can never disagree).
fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &AdjustmentFilter) {
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search.trim());
        query
            .push(" AND (a.reference_number LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.sku LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(status) = filter.status {
        query.push(" AND a.status = ").push_bind(status);
    }
    if let Some(adjustment_type) = filter.adjustment_type {
        query
            .push(" AND a.adjustment_type = ")
            .push_bind(adjustment_type);
    }
    if let Some(reason) = filter.reason {
        query.push(" AND a.reason = ").push_bind(reason);
    }
    if let Some(product_id) = &filter.product_id {
        query.push(" AND a.product_id = ").push_bind(product_id.clone());
    }
    if let Some(date_from) = filter.date_from {
        query.push(" AND a.adjustment_date >= ").push_bind(date_from);
    }
    if let Some(date_to) = filter.date_to {
        query.push(" AND a.adjustment_date <= ").push_bind(date_to);
    }
}

/// Translates the core state guards into storage-level conflicts.
fn map_state_guard(result: Result<(), CoreError>) -> DbResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(CoreError::InvalidAdjustmentStatus { id, current_status }) => {
            Err(DbError::state_conflict("Adjustment", id, current_status))
        }
        Err(other) => Err(DbError::Internal(other.to_string())),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use tally_core::Product;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_product(db: &Database, sku: &str, stock: i64) -> Product {
        db.products().create(sku, "Widget", 1_000, stock).await.unwrap()
    }

    fn proposal(product_id: &str, adjustment_type: AdjustmentType, quantity: i64) -> NewAdjustment {
        NewAdjustment {
            product_id: product_id.to_string(),
            adjustment_type,
            quantity_adjusted: quantity,
            reason: AdjustmentReason::Correction,
            adjustment_date: Utc::now().date_naive(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_propose_creates_pending_record() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();

        let adjustment = db
            .adjustments()
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();

        assert_eq!(adjustment.status, AdjustmentStatus::Pending);
        assert!(adjustment.reference_number.starts_with("ADJ-"));
        assert_eq!(adjustment.old_quantity, None);
        assert_eq!(adjustment.new_quantity, None);
        assert_eq!(adjustment.created_by, "emp-1");
        assert_eq!(adjustment.approved_by, None);

        // No Product Store side effect on propose.
        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 50);
    }

    #[tokio::test]
    async fn test_propose_unknown_product() {
        let db = test_db().await;
        let policy = AdjustmentPolicy::default();

        let err = db
            .adjustments()
            .propose(&proposal("nope", AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_propose_invalid_input() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();

        let err = db
            .adjustments()
            .propose(&proposal(&product.id, AdjustmentType::Increase, 0), &policy, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_approve_increase_applies_and_freezes() {
        // Product at 50, increase of 10 approved → 60, quantities frozen.
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        let outcome = repo.approve(&adjustment.id, "boss-1").await.unwrap();

        assert_eq!(outcome.stock_quantity, 60);
        assert!(!outcome.clamped);
        assert_eq!(outcome.adjustment.status, AdjustmentStatus::Approved);
        assert_eq!(outcome.adjustment.old_quantity, Some(50));
        assert_eq!(outcome.adjustment.new_quantity, Some(60));
        assert_eq!(outcome.adjustment.approved_by.as_deref(), Some("boss-1"));
        assert!(outcome.adjustment.approved_at.is_some());

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 60);
    }

    #[tokio::test]
    async fn test_approve_decrease_clamps_at_zero() {
        // Product at 5, decrease of 20 approved → clamped to 0, flagged.
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 5).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Decrease, 20), &policy, "emp-1")
            .await
            .unwrap();
        let outcome = repo.approve(&adjustment.id, "boss-1").await.unwrap();

        assert_eq!(outcome.stock_quantity, 0);
        assert!(outcome.clamped);
        assert_eq!(outcome.adjustment.old_quantity, Some(5));
        assert_eq!(outcome.adjustment.new_quantity, Some(0));

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 0);
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_safe() {
        // Second approve must not re-apply the delta.
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        repo.approve(&adjustment.id, "boss-1").await.unwrap();

        let err = repo.approve(&adjustment.id, "boss-2").await.unwrap_err();
        match err {
            DbError::StateConflict { status, .. } => assert_eq!(status, "approved"),
            other => panic!("expected state conflict, got {other:?}"),
        }

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 60);
    }

    #[tokio::test]
    async fn test_approve_missing_adjustment() {
        let db = test_db().await;
        let err = db.adjustments().approve("nope", "boss-1").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reject_leaves_stock_and_freezes_record() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Decrease, 10), &policy, "emp-1")
            .await
            .unwrap();
        let rejected = repo.reject(&adjustment.id, "boss-1").await.unwrap();

        assert_eq!(rejected.status, AdjustmentStatus::Rejected);
        assert_eq!(rejected.old_quantity, None);
        assert_eq!(rejected.new_quantity, None);
        assert_eq!(rejected.approved_by.as_deref(), Some("boss-1"));

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 50);

        // Terminal records are immutable.
        let err = repo
            .edit(&adjustment.id, &AdjustmentPatch::default(), &policy, "emp-1")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));

        let err = repo.delete(&adjustment.id, "emp-1").await.unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_edit_pending_keeps_reference() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let other = seed_product(&db, "WID-2", 5).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();

        let patch = AdjustmentPatch {
            product_id: Some(other.id.clone()),
            adjustment_type: Some(AdjustmentType::Decrease),
            quantity_adjusted: Some(3),
            reason: Some(AdjustmentReason::Damage),
            notes: Some(Some("dropped pallet".to_string())),
            ..AdjustmentPatch::default()
        };
        let edited = repo.edit(&adjustment.id, &patch, &policy, "emp-1").await.unwrap();

        assert_eq!(edited.reference_number, adjustment.reference_number);
        assert_eq!(edited.product_id, other.id);
        assert_eq!(edited.adjustment_type, AdjustmentType::Decrease);
        assert_eq!(edited.quantity_adjusted, 3);
        assert_eq!(edited.reason, AdjustmentReason::Damage);
        assert_eq!(edited.notes.as_deref(), Some("dropped pallet"));

        // An untouched patch leaves notes alone; an explicit inner None
        // clears them.
        let untouched = repo
            .edit(&adjustment.id, &AdjustmentPatch::default(), &policy, "emp-1")
            .await
            .unwrap();
        assert_eq!(untouched.notes.as_deref(), Some("dropped pallet"));

        let cleared = repo
            .edit(
                &adjustment.id,
                &AdjustmentPatch {
                    notes: Some(None),
                    ..AdjustmentPatch::default()
                },
                &policy,
                "emp-1",
            )
            .await
            .unwrap();
        assert_eq!(cleared.notes, None);
    }

    #[tokio::test]
    async fn test_delete_pending() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        repo.delete(&adjustment.id, "emp-1").await.unwrap();

        let err = repo.get(&adjustment.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_opposing_adjustments_commute() {
        // +10 and -3 against the same product, approved in either order,
        // land on initial + 7.
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 40).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let increase = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        let decrease = repo
            .propose(&proposal(&product.id, AdjustmentType::Decrease, 3), &policy, "emp-1")
            .await
            .unwrap();

        // Decrease first this time; the second approval must see the
        // first one's updated quantity, never a stale read.
        let first = repo.approve(&decrease.id, "boss-1").await.unwrap();
        assert_eq!(first.stock_quantity, 37);

        let second = repo.approve(&increase.id, "boss-1").await.unwrap();
        assert_eq!(second.stock_quantity, 47);
        assert_eq!(second.adjustment.old_quantity, Some(37));

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 40 + 10 - 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_serialize_on_file_backed_db() {
        // Default config: multi-connection pool, file-backed, WAL. Twenty
        // pending adjustments on the same product approved concurrently must
        // all land - writers queue on the lock instead of aborting with an
        // opaque "database is locked" failure.
        let path = std::env::temp_dir().join(format!("tally-approve-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let product = db.products().create("WID-1", "Widget", 1_000, 1).await.unwrap();
        let policy = AdjustmentPolicy::default();

        let mut pending = Vec::new();
        for _ in 0..20 {
            let adjustment = db
                .adjustments()
                .propose(&proposal(&product.id, AdjustmentType::Increase, 5), &policy, "emp-1")
                .await
                .unwrap();
            pending.push(adjustment.id);
        }

        let mut handles = Vec::new();
        for id in pending {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.adjustments().approve(&id, "boss-1").await
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.adjustment.status, AdjustmentStatus::Approved);
        }

        let product = db.products().get_required(&product.id).await.unwrap();
        assert_eq!(product.stock_quantity, 1 + 20 * 5);

        db.close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_decisions_surface_state_conflict() {
        // Approve and reject racing on the same adjustment: exactly one
        // decision wins, the loser gets StateConflict, never a raw lock
        // error, and the product reflects the winner only.
        let path = std::env::temp_dir().join(format!("tally-race-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let product = db.products().create("WID-1", "Widget", 1_000, 50).await.unwrap();
        let policy = AdjustmentPolicy::default();

        let adjustment = db
            .adjustments()
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();

        let approve = {
            let db = db.clone();
            let id = adjustment.id.clone();
            tokio::spawn(async move { db.adjustments().approve(&id, "boss-1").await.map(|_| ()) })
        };
        let reject = {
            let db = db.clone();
            let id = adjustment.id.clone();
            tokio::spawn(async move { db.adjustments().reject(&id, "boss-2").await.map(|_| ()) })
        };

        let results = [approve.await.unwrap(), reject.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, DbError::StateConflict { .. }), "got {err:?}");
            }
        }

        let decided = db.adjustments().get(&adjustment.id).await.unwrap();
        let product = db.products().get_required(&product.id).await.unwrap();
        match decided.status {
            AdjustmentStatus::Approved => assert_eq!(product.stock_quantity, 60),
            AdjustmentStatus::Rejected => assert_eq!(product.stock_quantity, 50),
            AdjustmentStatus::Pending => panic!("race left the adjustment undecided"),
        }

        db.close().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn test_reference_numbers_unique_under_concurrent_proposes() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;

        let mut handles = Vec::new();
        for _ in 0..100 {
            let db = db.clone();
            let product_id = product.id.clone();
            handles.push(tokio::spawn(async move {
                let policy = AdjustmentPolicy::default();
                db.adjustments()
                    .propose(
                        &proposal(&product_id, AdjustmentType::Increase, 1),
                        &policy,
                        "emp-1",
                    )
                    .await
                    .unwrap()
                    .reference_number
            }));
        }

        let mut references = std::collections::HashSet::new();
        for handle in handles {
            assert!(references.insert(handle.await.unwrap()));
        }
        assert_eq!(references.len(), 100);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = test_db().await;
        let widget = seed_product(&db, "WID-1", 50).await;
        let gadget = db.products().create("GAD-1", "Gadget", 500, 20).await.unwrap();
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let a = repo
            .propose(&proposal(&widget.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        let b = repo
            .propose(&proposal(&gadget.id, AdjustmentType::Decrease, 5), &policy, "emp-1")
            .await
            .unwrap();
        repo.approve(&a.id, "boss-1").await.unwrap();

        // By status.
        let pending = repo
            .list(&AdjustmentFilter {
                status: Some(AdjustmentStatus::Pending),
                ..AdjustmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.items[0].adjustment.id, b.id);
        assert_eq!(pending.items[0].display_delta, None);

        // By type.
        let increases = repo
            .list(&AdjustmentFilter {
                adjustment_type: Some(AdjustmentType::Increase),
                ..AdjustmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(increases.total, 1);
        assert_eq!(increases.items[0].adjustment.id, a.id);
        assert_eq!(increases.items[0].display_delta.as_deref(), Some("50 → 60"));

        // By search over SKU.
        let searched = repo
            .list(&AdjustmentFilter {
                search: Some("GAD".to_string()),
                ..AdjustmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.total, 1);
        assert_eq!(searched.items[0].product_sku, "GAD-1");

        // Date range excluding everything.
        let none = repo
            .list(&AdjustmentFilter {
                date_to: Some(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
                ..AdjustmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        for _ in 0..5 {
            repo.propose(&proposal(&product.id, AdjustmentType::Increase, 1), &policy, "emp-1")
                .await
                .unwrap();
        }

        let page = repo
            .list(&AdjustmentFilter {
                limit: 2,
                offset: 4,
                ..AdjustmentFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.limit, 2);
        assert_eq!(page.offset, 4);
    }

    #[tokio::test]
    async fn test_export_rows() {
        let db = test_db().await;
        let product = seed_product(&db, "WID-1", 50).await;
        let policy = AdjustmentPolicy::default();
        let repo = db.adjustments();

        let adjustment = repo
            .propose(&proposal(&product.id, AdjustmentType::Increase, 10), &policy, "emp-1")
            .await
            .unwrap();
        repo.approve(&adjustment.id, "boss-1").await.unwrap();

        let rows = repo.export_rows(&AdjustmentFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "reference");
        assert_eq!(rows[1][1], "WID-1");
        assert_eq!(rows[1][6], "approved");
        assert_eq!(rows[1][7], "50 → 60");
    }
}
