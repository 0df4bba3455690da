//! # tally: counters and bills for marketplace stock and balances
//!
//! `tally` keeps the numeric counters of a marketplace (SKU and product `stock`/`sales`, user
//! `now_money`/`integral`/`brokerage_price`, merchant `margin`) and the append-only bills that
//! explain every balance change.
//!
//! ## Guarantees
//!
//! - Counter changes are atomic conditional updates, never read-modify-write. A guarded
//!   decrement cannot take a counter below zero, however many callers race on it.
//! - Everything one logical operation writes (paired counters such as stock down / sales up,
//!   and the bills describing them) is one unit of work: it all lands or none of it does.
//! - A bill's balance is the counter value produced by the same unit of work.
//! - Bills are never updated or deleted.
//!
//! ## Layout
//!
//! - [`store`]: the [`Store`] unit of work, backed by PostgreSQL or memory
//! - [`db`]: PostgreSQL repositories and models
//! - [`inventory`]: stock operations over a SKU and its product
//! - [`wallet`]: balance operations that record bills
//! - [`notifications`]: best-effort delivery of committed bills
//! - [`config`], [`telemetry`], [`cli`]: the ambient plumbing of the `tally` binary
//!
//! ## Example
//!
//! ```ignore
//! let store = PostgresStore::new(tally::connect(&config).await?);
//! let wallet = Wallet::new(store, Notifications::new(Arc::new(LogNotifier), config.notifications.clone()));
//!
//! let bill = wallet
//!     .inc_bill(uid, BillCategory::NowMoney, "recharge", BillRequest::new(amount, "Recharge").with_link(order_id))
//!     .await?;
//! assert_eq!(bill.balance, wallet.balance(uid, BillCategory::NowMoney).await?);
//! ```

use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod inventory;
pub mod notifications;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod wallet;

pub use config::Config;
pub use db::models::counters::{Counter, EntityKey, Guard, Mutation, Outcome};
pub use db::models::ledger::{BillCategory, Direction, LedgerEntryCreateDBRequest, LedgerEntryDBResponse, LedgerFilter};
pub use db::models::products::ProductKind;
pub use errors::{Error, Result};
pub use inventory::{Inventory, StockLevel};
pub use notifications::{ChannelNotifier, LogNotifier, Notifications, Notifier};
pub use store::{Applied, BalanceSource, BillDraft, Change, Store, in_memory::InMemoryStore, postgres::PostgresStore};
pub use wallet::{BalanceAudit, BillRequest, Wallet};

/// Get the tally database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Open a connection pool from the database settings, logging slow statements at WARN.
pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.database.url)?.log_slow_statements(
        log::LevelFilter::Warn,
        Duration::from_millis(config.slow_statement_threshold_ms),
    );

    let settings = &config.database.pool;
    let secs = |value: u64| (value > 0).then(|| Duration::from_secs(value));

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(secs(settings.idle_timeout_secs))
        .max_lifetime(secs(settings.max_lifetime_secs))
        .connect_with(options)
        .await?;

    info!(max_connections = settings.max_connections, "Connected to database");
    Ok(pool)
}
