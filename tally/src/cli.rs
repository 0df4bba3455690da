//! Operator commands.
//!
//! Each command runs one operation against PostgreSQL and prints its result as JSON on stdout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::models::ledger::{BillCategory, Direction, LedgerFilter};
use crate::db::models::products::ProductKind;
use crate::inventory::Inventory;
use crate::notifications::{ChannelNotifier, LogNotifier, Notifications, run_notification_worker};
use crate::store::postgres::PostgresStore;
use crate::types::{EntityId, ProductId};
use crate::wallet::{BillRequest, Wallet};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Take, return or show SKU stock
    #[command(subcommand)]
    Stock(StockCommand),
    /// Change a balance and record the bill
    #[command(subcommand)]
    Bill(BillCommand),
    /// List bills, newest first
    Bills(BillsArgs),
    /// Show a balance next to the newest bill's balance
    Balance {
        entity_id: EntityId,
        category: BillCategory,
    },
}

#[derive(Subcommand, Debug)]
pub enum StockCommand {
    /// Sell: stock down, sales up
    Desc(StockArgs),
    /// Return: stock up, sales down while they cover it
    Inc(StockArgs),
    Show {
        product_id: ProductId,
        unique: String,
        /// `ordinary` or `<kind>:<activity_id>`, e.g. `seckill:12`
        #[arg(long, default_value = "ordinary")]
        kind: ProductKind,
    },
}

#[derive(ClapArgs, Debug)]
pub struct StockArgs {
    pub product_id: ProductId,
    pub unique: String,
    pub num: Decimal,
    /// `ordinary` or `<kind>:<activity_id>`, e.g. `seckill:12`
    #[arg(long, default_value = "ordinary")]
    pub kind: ProductKind,
}

#[derive(Subcommand, Debug)]
pub enum BillCommand {
    /// Credit a balance
    Inc(BillArgs),
    /// Debit a balance, refused if it would go below zero
    Dec(BillArgs),
    /// Move an amount between two balances of one entity
    Transfer {
        entity_id: EntityId,
        from: BillCategory,
        to: BillCategory,
        bill_type: String,
        number: Decimal,
        #[command(flatten)]
        text: BillText,
    },
}

#[derive(ClapArgs, Debug)]
pub struct BillArgs {
    pub entity_id: EntityId,
    pub category: BillCategory,
    /// Machine-readable reason, e.g. `recharge` or `pay_product`
    pub bill_type: String,
    pub number: Decimal,
    #[command(flatten)]
    pub text: BillText,
}

#[derive(ClapArgs, Debug)]
pub struct BillText {
    #[arg(long, default_value = "")]
    pub title: String,
    #[arg(long, default_value = "")]
    pub mark: String,
    /// Order or admin action that caused the change
    #[arg(long)]
    pub link_id: Option<String>,
}

impl BillText {
    fn into_request(self, number: Decimal) -> BillRequest {
        let request = BillRequest::new(number, self.title).with_mark(self.mark);
        match self.link_id {
            Some(link_id) => request.with_link(link_id),
            None => request,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct BillsArgs {
    #[arg(long)]
    pub entity_id: Option<EntityId>,
    #[arg(long)]
    pub category: Option<BillCategory>,
    #[arg(long)]
    pub direction: Option<Direction>,
    #[arg(long)]
    pub bill_type: Option<String>,
    #[arg(long)]
    pub link_id: Option<String>,
    /// Only bills created at or after this RFC 3339 time
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
    /// Only bills created at or before this RFC 3339 time
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = 0)]
    pub skip: i64,
    #[arg(long, default_value_t = 20)]
    pub limit: i64,
}

impl From<BillsArgs> for LedgerFilter {
    fn from(args: BillsArgs) -> Self {
        LedgerFilter {
            entity_id: args.entity_id,
            category: args.category,
            direction: args.direction,
            bill_type: args.bill_type,
            link_id: args.link_id,
            since: args.since,
            until: args.until,
            skip: args.skip,
            limit: args.limit,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    let pool = crate::connect(config).await?;

    if let Command::Migrate = command {
        crate::migrator().run(&pool).await?;
        tracing::info!("Migrations applied");
        return Ok(());
    }

    let store = PostgresStore::new(pool);

    // Bills are logged by a worker fed through a queue, as an embedding service would do
    let (notifier, receiver) = ChannelNotifier::new(config.notifications.channel_capacity);
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });
    let worker = tokio::spawn(run_notification_worker(receiver, Arc::new(LogNotifier), shutdown.clone()));
    let notifications = Notifications::new(Arc::new(notifier), config.notifications.clone());

    let result = execute(command, store, notifications, config).await;

    // Every sender is gone once `execute` returns, so the worker drains and stops
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Notification worker failed");
    }

    result
}

async fn execute(command: Command, store: PostgresStore, notifications: Notifications, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Stock(command) => {
            let inventory = Inventory::new(store, config.inventory.clone());
            match command {
                StockCommand::Desc(args) => {
                    print_json(&inventory.desc_stock(args.kind, args.product_id, &args.unique, args.num).await?)
                }
                StockCommand::Inc(args) => {
                    print_json(&inventory.inc_stock(args.kind, args.product_id, &args.unique, args.num).await?)
                }
                StockCommand::Show { product_id, unique, kind } => {
                    print_json(&inventory.stock(kind, product_id, &unique).await?)
                }
            }
        }
        Command::Bill(command) => {
            let wallet = Wallet::new(store, notifications);
            match command {
                BillCommand::Inc(args) => print_json(
                    &wallet
                        .inc_bill(args.entity_id, args.category, &args.bill_type, args.text.into_request(args.number))
                        .await?,
                ),
                BillCommand::Dec(args) => print_json(
                    &wallet
                        .dec_bill(args.entity_id, args.category, &args.bill_type, args.text.into_request(args.number))
                        .await?,
                ),
                BillCommand::Transfer {
                    entity_id,
                    from,
                    to,
                    bill_type,
                    number,
                    text,
                } => print_json(&wallet.transfer(entity_id, from, to, &bill_type, text.into_request(number)).await?),
            }
        }
        Command::Bills(args) => {
            let wallet = Wallet::new(store, notifications);
            print_json(&wallet.bills(&args.into()).await?)
        }
        Command::Balance { entity_id, category } => {
            let wallet = Wallet::new(store, notifications);
            print_json(&wallet.audit(entity_id, category).await?)
        }
    }
}
