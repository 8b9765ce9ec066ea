//! # Adjustment State Machine
//!
//! Pure guards and math for the stock-adjustment workflow. The database layer
//! enforces the same rules again in SQL (conditional writes keyed on the
//! current status); these functions are the single place the semantics are
//! written down and unit-tested.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Stock Adjustment Lifecycle                            │
//! │                                                                         │
//! │  propose() ──► pending ──┬── approve() ──► approved  (stock mutated,   │
//! │                 │        │                            quantities frozen)│
//! │                 │        └── reject()  ──► rejected  (stock untouched) │
//! │                 │                                                       │
//! │                 ├── edit()   allowed                                    │
//! │                 └── delete() allowed                                    │
//! │                                                                         │
//! │  approved / rejected: immutable, kept forever for audit                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult};
use crate::types::{AdjustmentStatus, AdjustmentType};

// =============================================================================
// Transition Guards
// =============================================================================

/// Checks that an adjustment may transition from `current` to `next`.
///
/// The only legal transitions are `pending → approved` and
/// `pending → rejected`. Everything else - including self-transitions and
/// anything out of a terminal state - is a state conflict.
pub fn check_transition(
    adjustment_id: &str,
    current: AdjustmentStatus,
    next: AdjustmentStatus,
) -> CoreResult<()> {
    let legal = current == AdjustmentStatus::Pending && next.is_terminal();
    if legal {
        Ok(())
    } else {
        Err(CoreError::InvalidAdjustmentStatus {
            id: adjustment_id.to_string(),
            current_status: current.to_string(),
        })
    }
}

/// Checks that an adjustment may be edited or deleted.
/// Terminal records are the audit trail and are immutable.
pub fn check_mutable(adjustment_id: &str, current: AdjustmentStatus) -> CoreResult<()> {
    if current.is_mutable() {
        Ok(())
    } else {
        Err(CoreError::InvalidAdjustmentStatus {
            id: adjustment_id.to_string(),
            current_status: current.to_string(),
        })
    }
}

// =============================================================================
// Quantity Math
// =============================================================================

/// Result of applying an adjustment to an observed stock quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedQuantity {
    /// The quantity to write back to the Product Store.
    pub new_quantity: i64,
    /// True when a decrease was clamped at zero. Must be surfaced to the
    /// caller as a warning, never hidden.
    pub clamped: bool,
}

/// Computes the post-approval quantity from the observed one.
///
/// - increase: `old + quantity_adjusted`
/// - decrease: `max(0, old - quantity_adjusted)`, flagged when clamped
///
/// Clamping instead of rejecting is deliberate: negative inventory is never
/// allowed, and the recorded delta may understate the nominal one.
pub fn apply_adjustment(
    adjustment_type: AdjustmentType,
    old_quantity: i64,
    quantity_adjusted: i64,
) -> AppliedQuantity {
    match adjustment_type {
        AdjustmentType::Increase => AppliedQuantity {
            new_quantity: old_quantity + quantity_adjusted,
            clamped: false,
        },
        AdjustmentType::Decrease => {
            let raw = old_quantity - quantity_adjusted;
            AppliedQuantity {
                new_quantity: raw.max(0),
                clamped: raw < 0,
            }
        }
    }
}

// =============================================================================
// Reference Numbers
// =============================================================================

/// Prefix shared by all adjustment references.
pub const REFERENCE_PREFIX: &str = "ADJ";

/// Formats a reference number: `ADJ-YYYYMMDD-NNNN`.
///
/// - date component keeps references human-legible and sortable
/// - sequence comes from the storage layer (max-per-day + 1), NOT from an
///   in-process counter, so multiple server instances stay collision-free
/// - once assigned, a reference is never regenerated, even on edit
pub fn format_reference(date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}-{}-{:04}",
        REFERENCE_PREFIX,
        date.format("%Y%m%d"),
        sequence
    )
}

/// The `ADJ-YYYYMMDD-` prefix for a given day, used by the storage layer to
/// scan for the day's highest sequence.
pub fn reference_day_prefix(date: NaiveDate) -> String {
    format!("{}-{}-", REFERENCE_PREFIX, date.format("%Y%m%d"))
}

// =============================================================================
// Unit Tests
// =============================================================================
