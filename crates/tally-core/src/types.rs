//! # Domain Types
//!
//! Core domain types used throughout Tally Ops.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌───────────────────┐   ┌──────────────────┐    │
//! │  │    Product      │   │  StockAdjustment  │   │ BalanceSheetEntry│    │
//! │  │  ─────────────  │   │  ───────────────  │   │  ──────────────  │    │
//! │  │  id (UUID)      │   │  id (UUID)        │   │  id (UUID)       │    │
//! │  │  sku (business) │   │  reference_number │   │  employee_id     │    │
//! │  │  unit_price     │   │  status           │   │  entry_date      │    │
//! │  │  stock_quantity │   │  old/new_quantity │   │  current_balance │    │
//! │  └─────────────────┘   └───────────────────┘   └──────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ProductDelivery  │   │     Expense     │   │    StockLot     │       │
//! │  │ payment_status  │   │     status      │   │ qty × unit_price│       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists (sku, reference_number) - human-readable

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Adjustment Enums
// =============================================================================

/// Direction of a stock adjustment.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    /// Adds to the product's on-hand quantity.
    Increase,
    /// Removes from the product's on-hand quantity (clamped at zero).
    Decrease,
}

impl AdjustmentType {
    /// Stable string form, matches the persisted value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Increase => "increase",
            AdjustmentType::Decrease => "decrease",
        }
    }
}

impl std::fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a stock adjustment.
///
/// ## State Machine
/// ```text
///              ┌──────────┐
///      ┌──────►│ approved │ (terminal)
///      │       └──────────┘
/// ┌─────────┐
/// │ pending │
/// └─────────┘
///      │       ┌──────────┐
///      └──────►│ rejected │ (terminal)
///              └──────────┘
/// ```
/// No transition out of a terminal state. No self-transition.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentStatus {
    /// Proposed, awaiting review. The only editable state.
    Pending,
    /// Applied to the product store. Immutable.
    Approved,
    /// Declined by a reviewer, stock untouched. Immutable.
    Rejected,
}

impl AdjustmentStatus {
    /// Stable string form, matches the persisted value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Pending => "pending",
            AdjustmentStatus::Approved => "approved",
            AdjustmentStatus::Rejected => "rejected",
        }
    }

    /// Whether this status permits no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, AdjustmentStatus::Approved | AdjustmentStatus::Rejected)
    }

    /// Whether the record may be mutated (edited, deleted, decided).
    pub const fn is_mutable(&self) -> bool {
        matches!(self, AdjustmentStatus::Pending)
    }
}

impl std::fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for AdjustmentStatus {
    fn default() -> Self {
        AdjustmentStatus::Pending
    }
}

/// Why the stock level is being corrected. Closed set, validated against the
/// configured allow-list (see [`crate::validation::AdjustmentPolicy`]).
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentReason {
    Damage,
    Loss,
    Correction,
    Return,
    Other,
}

impl AdjustmentReason {
    /// All reasons, in display order.
    pub const ALL: [AdjustmentReason; 5] = [
        AdjustmentReason::Damage,
        AdjustmentReason::Loss,
        AdjustmentReason::Correction,
        AdjustmentReason::Return,
        AdjustmentReason::Other,
    ];

    /// Stable string form, matches the persisted value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Damage => "damage",
            AdjustmentReason::Loss => "loss",
            AdjustmentReason::Correction => "correction",
            AdjustmentReason::Return => "return",
            AdjustmentReason::Other => "other",
        }
    }
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Source Enums
// =============================================================================

/// Payment state of a product delivery. Pending deliveries are counted as
/// market dues in the reconciliation engine.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// Review state of an expense. Only approved expenses count toward
/// `total_expenses`.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

// =============================================================================
// Product
// =============================================================================

/// A product in the Product Store.
///
/// `stock_quantity` is mutated only through the adjustment approval flow
/// (or external flows outside this module); it never goes below zero.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Unit price in cents (smallest currency unit).
    pub unit_price_cents: i64,

    /// Current on-hand quantity. Non-negative.
    pub stock_quantity: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Stock Adjustment
// =============================================================================

/// A proposed or decided correction to a product's on-hand quantity.
///
/// ## Frozen Fields
/// `old_quantity`/`new_quantity` are NULL while pending and are set exactly
/// once, at the moment the status leaves `pending`. They never change
/// afterward - the record is the audit trail.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Human-legible audit reference, e.g. `ADJ-20260830-0001`.
    /// Unique across the whole ledger; never regenerated on edit.
    pub reference_number: String,

    /// Product whose quantity is being corrected.
    pub product_id: String,

    /// Direction of the correction.
    pub adjustment_type: AdjustmentType,

    /// Magnitude of the correction. Always positive.
    pub quantity_adjusted: i64,

    pub reason: AdjustmentReason,

    pub status: AdjustmentStatus,

    /// Product quantity observed at approval time. NULL until decided.
    pub old_quantity: Option<i64>,

    /// Product quantity written at approval time. NULL until decided.
    pub new_quantity: Option<i64>,

    /// Optional free text from the proposer.
    pub notes: Option<String>,

    /// Calendar date of the underlying event (distinct from `created_at`).
    #[ts(as = "String")]
    pub adjustment_date: NaiveDate,

    /// Actor who proposed the adjustment.
    pub created_by: String,

    /// Reviewer who decided (approved OR rejected). NULL until decided.
    pub approved_by: Option<String>,

    /// When the decision was made. NULL until decided.
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockAdjustment {
    /// Display delta for list views, e.g. `"50 → 60"`.
    /// None while the adjustment is still pending.
    pub fn display_delta(&self) -> Option<String> {
        match (self.old_quantity, self.new_quantity) {
            (Some(old), Some(new)) => Some(format!("{} → {}", old, new)),
            _ => None,
        }
    }
}

// =============================================================================
// Balance Sheet
// =============================================================================

/// One employee's recorded activity for a reporting date.
///
/// `total_amount_cents` is stored redundantly for history but always
/// recomputed server-side as delivery − expense; client-submitted totals are
/// never trusted.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BalanceSheetEntry {
    pub id: String,
    pub employee_id: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub location: Option<String>,
    pub delivery_amount_cents: i64,
    pub expense_amount_cents: i64,
    pub total_amount_cents: i64,
    /// Running account balance as of this entry. A ledger figure representing
    /// cash/credit, not inventory.
    pub current_balance_cents: i64,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl BalanceSheetEntry {
    /// Returns the running balance as Money.
    #[inline]
    pub fn current_balance(&self) -> Money {
        Money::from_cents(self.current_balance_cents)
    }

    /// Returns the period total (delivery − expense) as Money.
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

// =============================================================================
// Delivery / Expense / Stock Lot Sources
// =============================================================================

/// An append-only record of products delivered by an employee.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDelivery {
    pub id: String,
    pub employee_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub total_amount_cents: i64,
    pub payment_status: PaymentStatus,
    #[ts(as = "String")]
    pub delivered_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ProductDelivery {
    /// Returns the delivery total as Money.
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

/// An append-only record of an expense incurred by an employee.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub employee_id: String,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub status: ExpenseStatus,
    #[ts(as = "String")]
    pub incurred_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Returns the expense amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Stock currently held by an employee for one product.
/// Valuation always uses the product's unit price at query time.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockLot {
    pub id: String,
    pub employee_id: String,
    pub product_id: String,
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Request / Response Shapes
// =============================================================================

/// Input for proposing a stock adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewAdjustment {
    pub product_id: String,
    pub adjustment_type: AdjustmentType,
    pub quantity_adjusted: i64,
    pub reason: AdjustmentReason,
    #[ts(as = "String")]
    pub adjustment_date: NaiveDate,
    pub notes: Option<String>,
}

/// Partial update to a pending adjustment. `None` fields are left unchanged.
/// Changing `product_id` or `adjustment_type` is allowed only while pending,
/// which is the only state this patch can be applied in anyway.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentPatch {
    pub product_id: Option<String>,
    pub adjustment_type: Option<AdjustmentType>,
    pub quantity_adjusted: Option<i64>,
    pub reason: Option<AdjustmentReason>,
    #[ts(as = "Option<String>")]
    pub adjustment_date: Option<NaiveDate>,
    /// Two-level: outer `None` leaves notes unchanged, `Some(None)` clears
    /// them, `Some(Some(text))` replaces them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub notes: Option<Option<String>>,
}

/// Result of approving an adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ApprovalOutcome {
    /// The decided adjustment with frozen quantities.
    pub adjustment: StockAdjustment,
    /// The product's stock quantity after the write.
    pub stock_quantity: i64,
    /// True when a decrease was clamped at zero, i.e. the recorded
    /// `quantity_adjusted` understates the nominal delta. Surface this to the
    /// caller as a warning.
    pub clamped: bool,
}

/// One row of an adjustment listing, joined with its product summary.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentListItem {
    pub adjustment: StockAdjustment,
    pub product_name: String,
    pub product_sku: String,
    /// `"old → new"` once decided, None while pending.
    pub display_delta: Option<String>,
}

/// Offset-paginated collection.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching rows, ignoring limit/offset.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Input for recording a balance-sheet entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBalanceSheetEntry {
    pub employee_id: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub location: Option<String>,
    pub delivery_amount_cents: i64,
    pub expense_amount_cents: i64,
    pub current_balance_cents: i64,
    pub notes: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
