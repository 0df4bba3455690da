//! Balances and their bills.
//!
//! Every balance change goes through [`Wallet`], which adjusts the balance counter and appends
//! the bill describing it in one unit of work. The bill's balance is the counter value produced
//! by that same unit, so the two can never disagree. Committed bills are then handed to
//! [`Notifications`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::models::counters::{Guard, Mutation};
use crate::db::models::ledger::{BillCategory, Direction, LedgerEntryCreateDBRequest, LedgerEntryDBResponse, LedgerFilter};
use crate::errors::{Error, Result};
use crate::notifications::Notifications;
use crate::store::{BalanceSource, BillDraft, Change, Store};
use crate::types::EntityId;

/// What a caller says about a balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRequest {
    /// Amount moved, always positive
    pub number: Decimal,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mark: String,
    /// Order or admin action that caused the change
    #[serde(default)]
    pub link_id: Option<String>,
}

impl BillRequest {
    pub fn new(number: Decimal, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            mark: String::new(),
            link_id: None,
        }
    }

    pub fn with_mark(mut self, mark: impl Into<String>) -> Self {
        self.mark = mark.into();
        self
    }

    pub fn with_link(mut self, link_id: impl Into<String>) -> Self {
        self.link_id = Some(link_id.into());
        self
    }

    fn draft(
        &self,
        entity_id: EntityId,
        category: BillCategory,
        direction: Direction,
        bill_type: &str,
        mutation_index: usize,
    ) -> BillDraft {
        BillDraft {
            entity_id,
            category,
            direction,
            bill_type: bill_type.to_string(),
            amount: self.number,
            balance: BalanceSource::Resulting(mutation_index),
            title: self.title.clone(),
            mark: self.mark.clone(),
            link_id: self.link_id.clone(),
        }
    }
}

/// Counter value next to the balance the newest bill claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    pub counter: Decimal,
    /// `None` when no bill was ever recorded for the balance
    pub ledger: Option<Decimal>,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.ledger.is_none_or(|ledger| ledger == self.counter)
    }
}

pub struct Wallet<S> {
    store: S,
    notifications: Notifications,
}

impl<S: Store> Wallet<S> {
    pub fn new(store: S, notifications: Notifications) -> Self {
        Self { store, notifications }
    }

    fn check_number(category: BillCategory, number: Decimal) -> Result<()> {
        if number <= Decimal::ZERO {
            return Err(Error::InvalidAmount {
                counter: category.counter(),
                amount: number,
                reason: "must be positive",
            });
        }
        Ok(())
    }

    async fn commit(&self, change: Change) -> Result<Vec<LedgerEntryDBResponse>> {
        let applied = self.store.apply(change).await?;
        self.notifications.dispatch(&applied.entries).await;
        Ok(applied.entries)
    }

    async fn commit_one(&self, change: Change) -> Result<LedgerEntryDBResponse> {
        self.commit(change).await?.pop().ok_or_else(|| Error::Internal {
            operation: "read recorded bill".to_string(),
        })
    }

    /// Add `number` to the balance and record a credit bill carrying the new balance.
    #[instrument(skip(self, category, request), fields(category = %category, number = %request.number), err)]
    pub async fn inc_bill(
        &self,
        entity_id: EntityId,
        category: BillCategory,
        bill_type: &str,
        request: BillRequest,
    ) -> Result<LedgerEntryDBResponse> {
        Self::check_number(category, request.number)?;

        let key = category.entity_key(entity_id);
        let change = Change::new()
            .with_mutation(Mutation::increment(key, category.counter(), request.number))
            .with_bill(request.draft(entity_id, category, Direction::Credit, bill_type, 0));

        self.commit_one(change).await
    }

    /// Take `number` from the balance and record a debit bill carrying the new balance.
    ///
    /// # Errors
    /// - `Insufficient` if the balance is lower than `number`; nothing is written
    #[instrument(skip(self, category, request), fields(category = %category, number = %request.number), err)]
    pub async fn dec_bill(
        &self,
        entity_id: EntityId,
        category: BillCategory,
        bill_type: &str,
        request: BillRequest,
    ) -> Result<LedgerEntryDBResponse> {
        Self::check_number(category, request.number)?;

        let key = category.entity_key(entity_id);
        let change = Change::new()
            .with_mutation(Mutation::decrement(key, category.counter(), request.number, Guard::Reject))
            .with_bill(request.draft(entity_id, category, Direction::Debit, bill_type, 0));

        self.commit_one(change).await
    }

    /// Move `number` between two balances of the same entity, e.g. brokerage into now_money.
    ///
    /// Returns the debit bill of `from` followed by the credit bill of `to`.
    #[instrument(skip(self, from, to, request), fields(from = %from, to = %to, number = %request.number), err)]
    pub async fn transfer(
        &self,
        entity_id: EntityId,
        from: BillCategory,
        to: BillCategory,
        bill_type: &str,
        request: BillRequest,
    ) -> Result<Vec<LedgerEntryDBResponse>> {
        Self::check_number(from, request.number)?;

        let from_key = from.entity_key(entity_id);
        let to_key = to.entity_key(entity_id);
        if from == to || from_key.table() != to_key.table() {
            return Err(Error::BadRequest {
                message: format!("Cannot transfer from {from} to {to}"),
            });
        }

        let change = Change::new()
            .with_mutation(Mutation::decrement(from_key, from.counter(), request.number, Guard::Reject))
            .with_mutation(Mutation::increment(to_key, to.counter(), request.number))
            .with_bill(request.draft(entity_id, from, Direction::Debit, bill_type, 0))
            .with_bill(request.draft(entity_id, to, Direction::Credit, bill_type, 1));

        self.commit(change).await
    }

    /// Append a bill as given, without touching any balance.
    pub async fn record(&self, request: LedgerEntryCreateDBRequest) -> Result<LedgerEntryDBResponse> {
        self.commit_one(Change::new().with_bill(request.into())).await
    }

    pub async fn balance(&self, entity_id: EntityId, category: BillCategory) -> Result<Decimal> {
        self.store.counter(&category.entity_key(entity_id), category.counter()).await
    }

    pub async fn bills(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntryDBResponse>> {
        self.store.entries(filter).await
    }

    /// Compare a balance counter with the newest bill recorded for it.
    pub async fn audit(&self, entity_id: EntityId, category: BillCategory) -> Result<BalanceAudit> {
        let counter = self.balance(entity_id, category).await?;
        let ledger = self.store.latest_balance(entity_id, category).await?;
        let audit = BalanceAudit { counter, ledger };
        if !audit.is_consistent() {
            tracing::warn!(entity_id, category = %category, %counter, ?ledger, "Balance disagrees with newest bill");
        }
        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::NotificationsConfig;
    use crate::db::models::counters::{Counter, EntityKey};
    use crate::notifications::ChannelNotifier;
    use crate::store::in_memory::InMemoryStore;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn wallet() -> Wallet<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert_row(
            EntityKey::User { uid: 1 },
            &[(Counter::NowMoney, d(100)), (Counter::BrokeragePrice, d(30))],
        );
        store.insert_row(EntityKey::Merchant { mer_id: 1 }, &[(Counter::Margin, d(500))]);
        Wallet::new(store, Notifications::disabled())
    }

    #[tokio::test]
    async fn test_recharge_records_resulting_balance() {
        let wallet = wallet();

        let entry = wallet
            .inc_bill(1, BillCategory::NowMoney, "recharge", BillRequest::new(d(50), "User recharge").with_link("order-7"))
            .await
            .unwrap();

        assert_eq!(entry.amount, d(50));
        assert_eq!(entry.balance, d(150));
        assert_eq!(entry.direction, Direction::Credit);
        assert_eq!(entry.link_id.as_deref(), Some("order-7"));
        assert_eq!(wallet.balance(1, BillCategory::NowMoney).await.unwrap(), d(150));
        assert!(wallet.audit(1, BillCategory::NowMoney).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_insufficient_balance_writes_nothing() {
        let wallet = wallet();

        let err = wallet
            .dec_bill(1, BillCategory::NowMoney, "pay_product", BillRequest::new(Decimal::new(10001, 2), "Purchase"))
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Insufficient balance");
        assert_eq!(wallet.balance(1, BillCategory::NowMoney).await.unwrap(), d(100));
        assert!(wallet.bills(&LedgerFilter::for_entity(1, BillCategory::NowMoney)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_margin_belongs_to_merchant() {
        let wallet = wallet();

        let entry = wallet
            .dec_bill(1, BillCategory::Margin, "margin_deduct", BillRequest::new(d(120), "Penalty"))
            .await
            .unwrap();

        assert_eq!(entry.balance, d(380));
        // Margin is read from merchant 1, not user 1
        assert_eq!(wallet.balance(1, BillCategory::Margin).await.unwrap(), d(380));
    }

    #[tokio::test]
    async fn test_transfer_brokerage_to_balance() {
        let wallet = wallet();

        let entries = wallet
            .transfer(1, BillCategory::Brokerage, BillCategory::NowMoney, "brokerage_to_balance", BillRequest::new(d(20), "Withdraw"))
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].category, entries[0].direction, entries[0].balance), (BillCategory::Brokerage, Direction::Debit, d(10)));
        assert_eq!((entries[1].category, entries[1].direction, entries[1].balance), (BillCategory::NowMoney, Direction::Credit, d(120)));

        let err = wallet
            .transfer(1, BillCategory::Brokerage, BillCategory::NowMoney, "brokerage_to_balance", BillRequest::new(d(11), "Withdraw"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Insufficient { .. }));
        assert_eq!(wallet.balance(1, BillCategory::NowMoney).await.unwrap(), d(120));

        let err = wallet
            .transfer(1, BillCategory::Margin, BillCategory::NowMoney, "margin_to_balance", BillRequest::new(d(1), "Nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }

    #[tokio::test]
    async fn test_number_must_be_positive() {
        let wallet = wallet();

        for number in [d(0), d(-5)] {
            let err = wallet
                .inc_bill(1, BillCategory::Integral, "sign", BillRequest::new(number, "Sign in"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidAmount { .. }));
        }
    }

    #[tokio::test]
    async fn test_raw_record_can_drift_and_audit_notices() {
        let wallet = wallet();

        wallet
            .record(LedgerEntryCreateDBRequest {
                entity_id: 1,
                category: BillCategory::Integral,
                direction: Direction::Credit,
                bill_type: "system_add".to_string(),
                amount: d(5),
                balance: d(5),
                title: "Manual adjustment".to_string(),
                mark: String::new(),
                link_id: None,
            })
            .await
            .unwrap();

        let audit = wallet.audit(1, BillCategory::Integral).await.unwrap();
        assert_eq!(audit, BalanceAudit { counter: d(0), ledger: Some(d(5)) });
        assert!(!audit.is_consistent());
    }

    #[tokio::test]
    async fn test_committed_bills_are_notified() {
        let store = InMemoryStore::new();
        store.insert_row(EntityKey::User { uid: 2 }, &[]);
        let (notifier, mut receiver) = ChannelNotifier::new(4);
        let wallet = Wallet::new(
            store,
            Notifications::new(
                Arc::new(notifier),
                NotificationsConfig {
                    categories: vec![BillCategory::NowMoney],
                    ..Default::default()
                },
            ),
        );

        wallet
            .inc_bill(2, BillCategory::Integral, "sign", BillRequest::new(d(3), "Sign in"))
            .await
            .unwrap();
        let entry = wallet
            .inc_bill(2, BillCategory::NowMoney, "recharge", BillRequest::new(d(8), "Recharge"))
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap(), entry);
        assert!(receiver.try_recv().is_err());

        // A failed change notifies nothing
        wallet
            .dec_bill(2, BillCategory::NowMoney, "pay_product", BillRequest::new(d(9), "Purchase"))
            .await
            .unwrap_err();
        assert!(receiver.try_recv().is_err());
    }
}
