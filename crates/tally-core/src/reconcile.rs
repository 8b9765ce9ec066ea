//! # Reconciliation Engine
//!
//! Turns raw ledger inputs (deliveries, expenses, stock valuation, running
//! balance) into a consistent per-employee balance position.
//!
//! ## Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reconciliation Data Flow                             │
//! │                                                                         │
//! │  balance_sheets ────► current_balance  ─┐                               │
//! │  product_deliveries ► market_dues      ─┤                               │
//! │  stock_lots × price ► in_hand_value    ─┼──► FinancialSummary           │
//! │  expenses ──────────► total_expenses   ─┘        (derived,              │
//! │                                                   never persisted)      │
//! │                                                                         │
//! │  net_position = current_balance + in_hand_value − market_dues           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function here is pure: identical source data produces identical
//! output, and the summary is recomputed on every query so it cannot drift
//! from source truth. The storage layer re-reads stock quantities and unit
//! prices at call time; nothing here caches anything.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Expense, ExpenseStatus, PaymentStatus, ProductDelivery};

// =============================================================================
// Derived Types
// =============================================================================

/// One stock lot valued at the product's current unit price.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInHand {
    pub product_id: String,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// `quantity × unit_price`, valued at query time.
    pub total_value_cents: i64,
}

impl ProductInHand {
    /// Returns the lot value as Money.
    #[inline]
    pub fn total_value(&self) -> Money {
        Money::from_cents(self.total_value_cents)
    }
}

/// Per-employee financial summary. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FinancialSummary {
    /// Latest balance-sheet running balance (a cash/credit ledger figure).
    pub current_balance_cents: i64,
    /// Σ delivery totals where payment status = pending.
    pub market_dues_cents: i64,
    /// Σ held stock lots valued at current unit prices.
    pub products_in_hand_value_cents: i64,
    /// Σ all delivery totals regardless of payment status.
    pub total_deliveries_cents: i64,
    /// Σ approved expense amounts.
    pub total_expenses_cents: i64,
    /// current_balance + products_in_hand_value − market_dues.
    pub net_position_cents: i64,
}

impl FinancialSummary {
    #[inline]
    pub fn net_position(&self) -> Money {
        Money::from_cents(self.net_position_cents)
    }

    #[inline]
    pub fn market_dues(&self) -> Money {
        Money::from_cents(self.market_dues_cents)
    }
}

/// Full balance position block for a single employee.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BalancePosition {
    pub employee_id: String,
    pub financial_summary: FinancialSummary,
    pub products_in_hand: Vec<ProductInHand>,
    pub recent_deliveries: Vec<ProductDelivery>,
    pub recent_expenses: Vec<Expense>,
}

/// One row of the fleet balance listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EmployeeBalanceRow {
    pub employee_id: String,
    pub current_balance_cents: i64,
    pub market_dues_cents: i64,
    pub products_in_hand_value_cents: i64,
    pub net_position_cents: i64,
}

/// Fleet-wide aggregate block: plain sums over per-employee rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FleetSummary {
    pub total_employees: i64,
    pub total_balance_cents: i64,
    pub total_market_dues_cents: i64,
    pub total_products_in_hand_cents: i64,
}

// =============================================================================
// Component Sums
// =============================================================================

/// Σ delivery totals where payment status = pending.
pub fn market_dues(deliveries: &[ProductDelivery]) -> Money {
    deliveries
        .iter()
        .filter(|d| d.payment_status == PaymentStatus::Pending)
        .map(|d| d.total_amount())
        .sum()
}

/// Σ all delivery totals regardless of payment status.
pub fn total_deliveries(deliveries: &[ProductDelivery]) -> Money {
    deliveries.iter().map(|d| d.total_amount()).sum()
}

/// Σ approved expense amounts. Pending and rejected expenses are excluded;
/// a pending expense is not yet owed and a rejected one never will be.
pub fn total_expenses(expenses: &[Expense]) -> Money {
    expenses
        .iter()
        .filter(|e| e.status == ExpenseStatus::Approved)
        .map(|e| e.amount())
        .sum()
}

/// Values one lot at the current unit price.
pub fn value_lot(quantity: i64, unit_price: Money) -> Money {
    unit_price.saturating_mul_quantity(quantity)
}

/// Σ lot values.
pub fn products_in_hand_value(lots: &[ProductInHand]) -> Money {
    lots.iter().map(|l| l.total_value()).sum()
}

/// The net-position identity: `balance + in_hand − dues`.
pub fn net_position(current_balance: Money, in_hand_value: Money, dues: Money) -> Money {
    current_balance + in_hand_value - dues
}

// =============================================================================
// Summary Assembly
// =============================================================================

/// Computes the full per-employee summary from raw source rows.
///
/// Contract: deterministic. Given identical inputs this returns identical
/// output; there is no hidden state and no caching layer to go stale.
pub fn financial_summary(
    current_balance: Money,
    deliveries: &[ProductDelivery],
    expenses: &[Expense],
    lots: &[ProductInHand],
) -> FinancialSummary {
    let dues = market_dues(deliveries);
    let in_hand = products_in_hand_value(lots);

    FinancialSummary {
        current_balance_cents: current_balance.cents(),
        market_dues_cents: dues.cents(),
        products_in_hand_value_cents: in_hand.cents(),
        total_deliveries_cents: total_deliveries(deliveries).cents(),
        total_expenses_cents: total_expenses(expenses).cents(),
        net_position_cents: net_position(current_balance, in_hand, dues).cents(),
    }
}

/// Plain sums over per-employee rows; no special tie-breaks.
pub fn fleet_summary(rows: &[EmployeeBalanceRow]) -> FleetSummary {
    FleetSummary {
        total_employees: rows.len() as i64,
        total_balance_cents: rows.iter().map(|r| r.current_balance_cents).sum(),
        total_market_dues_cents: rows.iter().map(|r| r.market_dues_cents).sum(),
        total_products_in_hand_cents: rows
            .iter()
            .map(|r| r.products_in_hand_value_cents)
            .sum(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
