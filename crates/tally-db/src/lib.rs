//! # tally-db: Database Layer for Tally Ops
//!
//! SQLite persistence for the back-office inventory and
//! financial-reconciliation module.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        tally-db (THIS CRATE)                            │
//! │                                                                         │
//! │  ┌──────────┐  ┌────────────┐  ┌─────────────────────────────────────┐  │
//! │  │   pool   │  │ migrations │  │            repository               │  │
//! │  │ Database │  │  embedded  │  │  product / adjustment /             │  │
//! │  │ DbConfig │  │    SQL     │  │  activity / balance                 │  │
//! │  └──────────┘  └────────────┘  └─────────────────────────────────────┘  │
//! │                                                                         │
//! │  Business rules come from tally-core; this crate adds durability,       │
//! │  conditional writes, and the queries that feed the engine.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./tally.db")).await?;
//! let outcome = db.adjustments().approve("adj-id", "reviewer-1").await?;
//! if outcome.clamped {
//!     // surface the warning to the caller
//! }
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::activity::{ActivityRepository, NewDelivery, NewExpense};
pub use repository::adjustment::{AdjustmentFilter, AdjustmentRepository};
pub use repository::balance::BalanceRepository;
pub use repository::product::ProductRepository;
