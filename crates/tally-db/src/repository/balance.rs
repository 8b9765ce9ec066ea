//! # Balance Repository
//!
//! Balance-sheet entries plus the reconciliation queries built on them.
//!
//! ## Recomputed, Never Cached
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Per-Employee Position Assembly                         │
//! │                                                                         │
//! │  latest balance_sheets row ──► current_balance ─┐                       │
//! │  product_deliveries ─────────► dues / totals   ─┤  financial_summary()  │
//! │  expenses ───────────────────► total_expenses  ─┼──► (pure, tally-core) │
//! │  stock_lots ⋈ products ──────► in-hand value   ─┘                       │
//! │                                                                         │
//! │  Source rows are re-read on every query. A stock or price change is     │
//! │  visible on the very next call; there is no cached summary to drift.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::activity::ActivityRepository;
use tally_core::validation::{validate_id, validate_notes};
use tally_core::{
    financial_summary, fleet_summary, BalancePosition, BalanceSheetEntry, EmployeeBalanceRow,
    FleetSummary, Money, NewBalanceSheetEntry, Page, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};

/// How many recent deliveries/expenses ride along with a position block.
const RECENT_ACTIVITY_LIMIT: i64 = 10;

const ENTRY_COLUMNS: &str = "id, employee_id, entry_date, location, delivery_amount_cents, \
     expense_amount_cents, total_amount_cents, current_balance_cents, notes, \
     created_at, updated_at";

/// Repository for balance sheets and reconciliation.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    /// Creates a new BalanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BalanceRepository { pool }
    }

    fn activity(&self) -> ActivityRepository {
        ActivityRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Entries
    // -------------------------------------------------------------------------

    /// Records a balance-sheet entry for an employee and reporting date.
    ///
    /// `total_amount` is always recomputed here as delivery − expense. There
    /// is deliberately no way for a caller to supply it.
    pub async fn record_entry(&self, input: &NewBalanceSheetEntry) -> DbResult<BalanceSheetEntry> {
        validate_id("employee_id", &input.employee_id)?;
        validate_notes(input.notes.as_deref())?;

        debug!(employee_id = %input.employee_id, entry_date = %input.entry_date, "Recording balance entry");

        let now = Utc::now();
        let entry = BalanceSheetEntry {
            id: Uuid::new_v4().to_string(),
            employee_id: input.employee_id.clone(),
            entry_date: input.entry_date,
            location: input.location.clone(),
            delivery_amount_cents: input.delivery_amount_cents,
            expense_amount_cents: input.expense_amount_cents,
            total_amount_cents: input.delivery_amount_cents - input.expense_amount_cents,
            current_balance_cents: input.current_balance_cents,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO balance_sheets
                (id, employee_id, entry_date, location, delivery_amount_cents,
                 expense_amount_cents, total_amount_cents, current_balance_cents,
                 notes, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.employee_id)
        .bind(entry.entry_date)
        .bind(&entry.location)
        .bind(entry.delivery_amount_cents)
        .bind(entry.expense_amount_cents)
        .bind(entry.total_amount_cents)
        .bind(entry.current_balance_cents)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// The employee's most recent entry, if any.
    pub async fn latest_for_employee(&self, employee_id: &str) -> DbResult<Option<BalanceSheetEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM balance_sheets \
             WHERE employee_id = ?1 \
             ORDER BY entry_date DESC, created_at DESC LIMIT 1"
        );
        let entry = sqlx::query_as::<_, BalanceSheetEntry>(&sql)
            .bind(employee_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// The last entry on or before the given date (as-of lookup).
    pub async fn entry_on(
        &self,
        employee_id: &str,
        date: NaiveDate,
    ) -> DbResult<Option<BalanceSheetEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM balance_sheets \
             WHERE employee_id = ?1 AND entry_date <= ?2 \
             ORDER BY entry_date DESC, created_at DESC LIMIT 1"
        );
        let entry = sqlx::query_as::<_, BalanceSheetEntry>(&sql)
            .bind(employee_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Assembles the full balance position for one employee.
    ///
    /// An employee with no activity at all still gets a valid, all-zero
    /// position; absence of data is not an error here.
    pub async fn employee_position(&self, employee_id: &str) -> DbResult<BalancePosition> {
        validate_id("employee_id", employee_id)?;

        let activity = self.activity();

        let current_balance = self
            .latest_for_employee(employee_id)
            .await?
            .map(|e| e.current_balance())
            .unwrap_or(Money::zero());
        let deliveries = activity.deliveries_for_employee(employee_id, None).await?;
        let expenses = activity.expenses_for_employee(employee_id, None).await?;
        let lots = activity.lots_for_employee(employee_id).await?;

        let summary = financial_summary(current_balance, &deliveries, &expenses, &lots);

        let mut recent_deliveries = deliveries;
        recent_deliveries.truncate(RECENT_ACTIVITY_LIMIT as usize);
        let mut recent_expenses = expenses;
        recent_expenses.truncate(RECENT_ACTIVITY_LIMIT as usize);

        Ok(BalancePosition {
            employee_id: employee_id.to_string(),
            financial_summary: summary,
            products_in_hand: lots,
            recent_deliveries,
            recent_expenses,
        })
    }

    /// Lists per-employee balance rows plus the fleet-wide aggregate.
    ///
    /// The fleet summary is computed over ALL employees, not just the
    /// returned page, so the totals never change as the caller pages through.
    pub async fn list_positions(
        &self,
        limit: i64,
        offset: i64,
    ) -> DbResult<(Page<EmployeeBalanceRow>, FleetSummary)> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = offset.max(0);

        // Every employee known to any source table; an employee with only
        // expenses (say) still shows up in the fleet view.
        let employee_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT employee_id FROM balance_sheets
            UNION SELECT employee_id FROM product_deliveries
            UNION SELECT employee_id FROM expenses
            UNION SELECT employee_id FROM stock_lots
            ORDER BY employee_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut rows = Vec::with_capacity(employee_ids.len());
        for employee_id in &employee_ids {
            let position = self.employee_position(employee_id).await?;
            let s = position.financial_summary;
            rows.push(EmployeeBalanceRow {
                employee_id: employee_id.clone(),
                current_balance_cents: s.current_balance_cents,
                market_dues_cents: s.market_dues_cents,
                products_in_hand_value_cents: s.products_in_hand_value_cents,
                net_position_cents: s.net_position_cents,
            });
        }

        let fleet = fleet_summary(&rows);
        let total = rows.len() as i64;

        let items: Vec<EmployeeBalanceRow> = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok((
            Page {
                items,
                total,
                limit,
                offset,
            },
            fleet,
        ))
    }

    /// Convenience wrapper with default paging.
    pub async fn all_positions(&self) -> DbResult<(Page<EmployeeBalanceRow>, FleetSummary)> {
        self.list_positions(DEFAULT_PAGE_LIMIT, 0).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
