//! Database layer for counters and the bill ledger.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Inventory/Wallet │  (services composing units of work)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │      Store       │  (unit of work: PostgresStore or InMemoryStore)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │   Repositories   │  (db::handlers - SQL for counters and ledger)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │    PostgreSQL    │
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories borrow a connection. Anything that writes a counter and a bill must run both
//! through the same transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let balance = Counters::new(&mut tx).adjust(&mutation).await?;
//! Ledger::new(&mut tx).record(&entry).await?;
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded in the binary:
//!
//! ```ignore
//! tally::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
