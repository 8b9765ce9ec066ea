//! # Repository Modules
//!
//! Database access organized by domain area.
//!
//! ## Repository Pattern
//! Each repository wraps the shared connection pool and owns the SQL for one
//! domain area. Cross-cutting rules (state guards, quantity math, summary
//! assembly) live in `tally-core`; repositories apply them around conditional
//! writes.
//!
//! - [`product`] - the Product Store (CRUD + guarded stock writes)
//! - [`adjustment`] - the adjustment ledger lifecycle
//! - [`activity`] - delivery, expense, and stock-lot sources
//! - [`balance`] - balance sheets and the reconciliation queries

pub mod activity;
pub mod adjustment;
pub mod balance;
pub mod product;
