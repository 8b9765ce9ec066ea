//! # tally-core: Pure Business Logic for Tally Ops
//!
//! This crate is the **heart** of the back-office inventory and
//! financial-reconciliation module. It contains all business logic as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Tally Ops Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │            Back-office application (out of scope)               │    │
//! │  │    propose / review screens ── balance dashboards ── export     │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ tally-core (THIS CRATE) ★                       │    │
//! │  │                                                                 │    │
//! │  │  ┌──────────┐ ┌────────┐ ┌────────────┐ ┌───────────┐          │    │
//! │  │  │  types   │ │ money  │ │ adjustment │ │ reconcile │          │    │
//! │  │  │ Product  │ │ Money  │ │  guards +  │ │  engine   │          │    │
//! │  │  │ StockAdj │ │ cents  │ │   math     │ │ net pos.  │          │    │
//! │  │  └──────────┘ └────────┘ └────────────┘ └───────────┘          │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                   tally-db (Database Layer)                     │    │
//! │  │        SQLite queries, migrations, repositories, CAS writes     │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockAdjustment, BalanceSheetEntry, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`adjustment`] - Adjustment state-machine guards, quantity math, references
//! - [`reconcile`] - The reconciliation engine (pure, deterministic)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic - same input = same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::adjustment::apply_adjustment;
//! use tally_core::types::AdjustmentType;
//!
//! // Decreases clamp at zero instead of going negative.
//! let applied = apply_adjustment(AdjustmentType::Decrease, 5, 20);
//! assert_eq!(applied.new_quantity, 0);
//! assert!(applied.clamped);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod error;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tally_core::Money` instead of
// `use tally_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use reconcile::{
    financial_summary, fleet_summary, value_lot, BalancePosition, EmployeeBalanceRow,
    FinancialSummary, FleetSummary, ProductInHand,
};
pub use types::*;
pub use validation::AdjustmentPolicy;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default page size for listings.
pub const DEFAULT_PAGE_LIMIT: i64 = 25;

/// Maximum page size a caller may request.
pub const MAX_PAGE_LIMIT: i64 = 200;
