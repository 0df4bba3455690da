//! In-memory store.
//!
//! All rows and entries live behind one lock. A change is staged against copies of the rows it
//! touches and only written back once every mutation and bill has succeeded, so a failing change
//! leaves nothing behind. Suitable for tests and single-process embedding; data is lost on
//! restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::db::models::counters::{Counter, EntityKey, Outcome};
use crate::db::models::ledger::{BillCategory, LedgerEntryDBResponse, LedgerFilter};
use crate::errors::Result;
use crate::store::{Applied, Change, Store, missing, overflow, resolve_balance, unmatched};
use crate::types::{EntityId, LedgerEntryId};

type Row = HashMap<Counter, Decimal>;

#[derive(Default)]
struct State {
    rows: HashMap<EntityKey, Row>,
    /// Oldest first
    entries: Vec<LedgerEntryDBResponse>,
    last_entry_id: LedgerEntryId,
}

fn zeroed(key: &EntityKey) -> Row {
    key.table().counters().iter().map(|counter| (*counter, Decimal::ZERO)).collect()
}

/// In-memory implementation of the [`Store`] trait.
///
/// # Example
/// ```ignore
/// let store = InMemoryStore::new();
/// let key = EntityKey::User { uid: 1 };
/// store.insert_row(key.clone(), &[(Counter::NowMoney, Decimal::from(100))]);
/// store.adjust(Mutation::decrement(key, Counter::NowMoney, Decimal::from(30), Guard::Reject)).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a row. Counters not listed start at zero.
    pub fn insert_row(&self, key: EntityKey, values: &[(Counter, Decimal)]) {
        let mut row = zeroed(&key);
        for (counter, value) in values {
            row.insert(*counter, *value);
        }
        self.state.write().rows.insert(key, row);
    }
}

impl Store for InMemoryStore {
    async fn apply(&self, change: Change) -> Result<Applied> {
        change.validate()?;

        let mut state = self.state.write();

        // Rows touched by this change, written back only on success
        let mut staged: HashMap<EntityKey, Row> = HashMap::new();
        let mut outcomes = Vec::with_capacity(change.mutations.len());

        for mutation in &change.mutations {
            if !staged.contains_key(&mutation.key) {
                let Some(row) = state.rows.get(&mutation.key) else {
                    return Err(missing(&mutation.key));
                };
                staged.insert(mutation.key.clone(), row.clone());
            }
            let Some(row) = staged.get_mut(&mutation.key) else {
                return Err(missing(&mutation.key));
            };

            let current = row.get(&mutation.counter).copied().unwrap_or(Decimal::ZERO);
            let next = current.checked_add(mutation.signed_delta()).ok_or_else(|| overflow(mutation))?;

            let outcome = if mutation.is_guarded() && next < Decimal::ZERO {
                unmatched(mutation, Some(current))?
            } else {
                row.insert(mutation.counter, next);
                Outcome::Applied { value: next }
            };
            outcomes.push(outcome);
        }

        let mut entries = Vec::with_capacity(change.bills.len());
        let mut next_id = state.last_entry_id;
        for bill in change.bills {
            let balance = resolve_balance(bill.balance, &outcomes)?;
            next_id += 1;
            let request = bill.into_request(balance);
            entries.push(LedgerEntryDBResponse {
                id: next_id,
                entity_id: request.entity_id,
                category: request.category,
                direction: request.direction,
                bill_type: request.bill_type,
                amount: request.amount,
                balance: request.balance,
                title: request.title,
                mark: request.mark,
                link_id: request.link_id,
                created_at: Utc::now(),
            });
        }

        state.rows.extend(staged);
        state.entries.extend(entries.iter().cloned());
        state.last_entry_id = next_id;

        Ok(Applied { outcomes, entries })
    }

    async fn counter(&self, key: &EntityKey, counter: Counter) -> Result<Decimal> {
        let state = self.state.read();
        let row = state.rows.get(key).ok_or_else(|| missing(key))?;
        Ok(row.get(&counter).copied().unwrap_or(Decimal::ZERO))
    }

    async fn snapshot(&self, key: &EntityKey) -> Result<HashMap<Counter, Decimal>> {
        self.state.read().rows.get(key).cloned().ok_or_else(|| missing(key))
    }

    async fn ensure(&self, key: &EntityKey) -> Result<bool> {
        let mut state = self.state.write();
        if state.rows.contains_key(key) {
            return Ok(false);
        }
        state.rows.insert(key.clone(), zeroed(key));
        Ok(true)
    }

    async fn entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntryDBResponse>> {
        Ok(self.state.read().entries.iter().find(|entry| entry.id == id).cloned())
    }

    async fn entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntryDBResponse>> {
        filter.validate()?;
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn latest_balance(&self, entity_id: EntityId, category: BillCategory) -> Result<Option<Decimal>> {
        let state = self.state.read();
        Ok(state
            .entries
            .iter()
            .rev()
            .find(|entry| entry.entity_id == entity_id && entry.category == category)
            .map(|entry| entry.balance))
    }
}
