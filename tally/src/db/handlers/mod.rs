//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction and owns the SQL for one concern:
//!
//! - [`Counters`]: atomic conditional updates of counter columns on entity rows
//! - [`Ledger`]: the append-only bill table
//!
//! # Common Pattern
//!
//! ```ignore
//! use tally::db::handlers::{Counters, Ledger};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     let value = Counters::new(&mut tx).adjust(&mutation).await?;
//!     let entry = Ledger::new(&mut tx).record(&request).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! Repositories never open transactions themselves; the caller decides the unit of work.

pub mod counters;
pub mod ledger;
pub mod repository;

pub use counters::Counters;
pub use ledger::Ledger;
pub use repository::Repository;
