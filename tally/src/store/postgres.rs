//! PostgreSQL store.
//!
//! Each [`Change`] runs in its own transaction. Counter mutations are single conditional
//! `UPDATE ... RETURNING` statements, so concurrent changes against the same row serialize on the
//! row lock and a guarded decrement never observes a stale value. Any failure drops the
//! transaction, which rolls back every mutation and bill of the change.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use tracing::{debug, instrument};

use crate::db::errors::DbError;
use crate::db::handlers::{Counters, Ledger};
use crate::db::models::counters::{Counter, EntityKey, Outcome};
use crate::db::models::ledger::{BillCategory, LedgerEntryDBResponse, LedgerFilter};
use crate::errors::Result;
use crate::store::{Applied, Change, Store, missing, overflow, resolve_balance, unmatched};
use crate::types::{EntityId, LedgerEntryId};

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Store for PostgresStore {
    #[instrument(skip(self, change), fields(mutations = change.mutations.len(), bills = change.bills.len()), err)]
    async fn apply(&self, change: Change) -> Result<Applied> {
        change.validate()?;

        let mut tx = self.pool.begin().await?;

        let mut outcomes = Vec::with_capacity(change.mutations.len());
        for mutation in &change.mutations {
            let mut counters = Counters::new(&mut tx);
            let adjusted = counters.adjust(mutation).await.map_err(|err| match err {
                DbError::OutOfRange { .. } => overflow(mutation),
                other => other.into(),
            })?;
            let outcome = match adjusted {
                Some(value) => Outcome::Applied { value },
                None => {
                    let current = counters.get(&mutation.key, mutation.counter).await?;
                    unmatched(mutation, current)?
                }
            };
            outcomes.push(outcome);
        }

        let mut entries = Vec::with_capacity(change.bills.len());
        for bill in change.bills {
            let balance = resolve_balance(bill.balance, &outcomes)?;
            let entry = Ledger::new(&mut tx).record(&bill.into_request(balance)).await?;
            entries.push(entry);
        }

        tx.commit().await?;
        debug!(outcomes = ?outcomes, entries = entries.len(), "Change committed");

        Ok(Applied { outcomes, entries })
    }

    async fn counter(&self, key: &EntityKey, counter: Counter) -> Result<Decimal> {
        let mut conn = self.pool.acquire().await?;
        Counters::new(&mut conn).get(key, counter).await?.ok_or_else(|| missing(key))
    }

    async fn snapshot(&self, key: &EntityKey) -> Result<HashMap<Counter, Decimal>> {
        let mut conn = self.pool.acquire().await?;
        Counters::new(&mut conn).snapshot(key).await?.ok_or_else(|| missing(key))
    }

    async fn ensure(&self, key: &EntityKey) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(Counters::new(&mut conn).ensure(key).await?)
    }

    async fn entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntryDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Ledger::new(&mut conn).get(id).await?)
    }

    async fn entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntryDBResponse>> {
        filter.validate()?;
        let mut conn = self.pool.acquire().await?;
        Ok(Ledger::new(&mut conn).search(filter).await?)
    }

    async fn latest_balance(&self, entity_id: EntityId, category: BillCategory) -> Result<Option<Decimal>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Ledger::new(&mut conn).latest_balance(entity_id, category).await?)
    }
}
