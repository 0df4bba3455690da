//! Units of work over counters and the ledger.
//!
//! A [`Change`] bundles counter mutations and the bills describing them. A [`Store`] applies a
//! change all-or-nothing: either every mutation is applied (or skipped by its guard) and every
//! bill is appended, or nothing is written at all.
//!
//! Two implementations are provided:
//!
//! - [`postgres::PostgresStore`]: one database transaction per change
//! - [`in_memory::InMemoryStore`]: one critical section per change, for tests and embedding

use std::collections::HashMap;
use std::future::Future;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::models::counters::{Counter, EntityKey, Guard, Mutation, Outcome};
use crate::db::models::ledger::{BillCategory, Direction, LedgerEntryCreateDBRequest, LedgerEntryDBResponse, LedgerFilter};
use crate::errors::{Error, Result};
use crate::types::{EntityId, LedgerEntryId};

pub mod in_memory;
pub mod postgres;


/// Where a bill's balance snapshot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSource {
    /// The post-change value of the mutation at this index in the same change
    Resulting(usize),
    /// A value computed by the caller, stored as is
    Supplied(Decimal),
}

/// A bill to append as part of a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillDraft {
    pub entity_id: EntityId,
    pub category: BillCategory,
    pub direction: Direction,
    pub bill_type: String,
    pub amount: Decimal,
    pub balance: BalanceSource,
    pub title: String,
    pub mark: String,
    pub link_id: Option<String>,
}

impl BillDraft {
    fn into_request(self, balance: Decimal) -> LedgerEntryCreateDBRequest {
        LedgerEntryCreateDBRequest {
            entity_id: self.entity_id,
            category: self.category,
            direction: self.direction,
            bill_type: self.bill_type,
            amount: self.amount,
            balance,
            title: self.title,
            mark: self.mark,
            link_id: self.link_id,
        }
    }
}

impl From<LedgerEntryCreateDBRequest> for BillDraft {
    fn from(request: LedgerEntryCreateDBRequest) -> Self {
        Self {
            entity_id: request.entity_id,
            category: request.category,
            direction: request.direction,
            bill_type: request.bill_type,
            amount: request.amount,
            balance: BalanceSource::Supplied(request.balance),
            title: request.title,
            mark: request.mark,
            link_id: request.link_id,
        }
    }
}

/// Counter mutations and bills applied as one unit of work, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Change {
    pub mutations: Vec<Mutation>,
    pub bills: Vec<BillDraft>,
}

impl Change {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn with_bill(mut self, bill: BillDraft) -> Self {
        self.bills.push(bill);
        self
    }

    /// Reject changes that could never be applied, before touching any storage.
    pub fn validate(&self) -> Result<()> {
        if self.mutations.is_empty() && self.bills.is_empty() {
            return Err(Error::BadRequest {
                message: "Change contains no mutations and no bills".to_string(),
            });
        }

        for mutation in &self.mutations {
            let table = mutation.key.table();
            if !table.supports(mutation.counter) {
                return Err(Error::UnsupportedCounter {
                    table,
                    counter: mutation.counter,
                });
            }
            check_amount(mutation.counter, mutation.delta)?;
        }

        for bill in &self.bills {
            check_amount(bill.category.counter(), bill.amount)?;
            if bill.bill_type.trim().is_empty() {
                return Err(Error::BadRequest {
                    message: "Bill type must not be empty".to_string(),
                });
            }
            if let BalanceSource::Resulting(index) = bill.balance {
                if index >= self.mutations.len() {
                    return Err(Error::BadRequest {
                        message: format!("Bill balance refers to mutation {index}, change has {}", self.mutations.len()),
                    });
                }
            }
        }

        Ok(())
    }
}

fn check_amount(counter: Counter, amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::InvalidAmount {
            counter,
            amount,
            reason: "must not be negative",
        });
    }
    if amount.normalize().scale() > counter.scale() {
        return Err(Error::InvalidAmount {
            counter,
            amount,
            reason: "too many decimal places",
        });
    }
    Ok(())
}

/// Resolve a bill's balance against the outcomes of the change it belongs to
pub(crate) fn resolve_balance(source: BalanceSource, outcomes: &[Outcome]) -> Result<Decimal> {
    match source {
        BalanceSource::Supplied(balance) => Ok(balance),
        BalanceSource::Resulting(index) => outcomes.get(index).map(Outcome::value).ok_or_else(|| Error::Internal {
            operation: format!("resolve bill balance from mutation {index}"),
        }),
    }
}

pub(crate) fn missing(key: &EntityKey) -> Error {
    Error::NotFound {
        resource: key.table().name().to_string(),
        id: key.to_string(),
    }
}

pub(crate) fn overflow(mutation: &Mutation) -> Error {
    Error::Overflow {
        entity: mutation.key.to_string(),
        counter: mutation.counter,
    }
}

/// Decide what a mutation that matched no row means, given the row's current value.
pub(crate) fn unmatched(mutation: &Mutation, current: Option<Decimal>) -> Result<Outcome> {
    match current {
        None => Err(missing(&mutation.key)),
        Some(value) if mutation.is_guarded() && mutation.guard == Guard::Skip => Ok(Outcome::Skipped { value }),
        Some(_) => Err(Error::Insufficient {
            entity: mutation.key.to_string(),
            counter: mutation.counter,
            requested: mutation.delta,
        }),
    }
}

/// What a change did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    /// One outcome per mutation, in the order they were given
    pub outcomes: Vec<Outcome>,
    /// The appended bills, in the order they were given
    pub entries: Vec<LedgerEntryDBResponse>,
}

/// Storage for counters and the ledger.
///
/// Implementations must apply each [`Change`] atomically: a failed mutation (missing row,
/// rejected guard) or bill leaves all counters and the ledger exactly as they were.
pub trait Store: Send + Sync {
    /// Apply all mutations and append all bills of the change, or nothing.
    fn apply(&self, change: Change) -> impl Future<Output = Result<Applied>> + Send;

    /// Current value of a counter.
    ///
    /// # Errors
    /// - `NotFound` if the row does not exist
    fn counter(&self, key: &EntityKey, counter: Counter) -> impl Future<Output = Result<Decimal>> + Send;

    /// All counters of a row.
    ///
    /// # Errors
    /// - `NotFound` if the row does not exist
    fn snapshot(&self, key: &EntityKey) -> impl Future<Output = Result<HashMap<Counter, Decimal>>> + Send;

    /// Create the row with zeroed counters if it is missing. Returns true if it was created.
    fn ensure(&self, key: &EntityKey) -> impl Future<Output = Result<bool>> + Send;

    /// Get a single ledger entry.
    fn entry(&self, id: LedgerEntryId) -> impl Future<Output = Result<Option<LedgerEntryDBResponse>>> + Send;

    /// List ledger entries, newest first.
    fn entries(&self, filter: &LedgerFilter) -> impl Future<Output = Result<Vec<LedgerEntryDBResponse>>> + Send;

    /// Balance snapshot of the newest entry for an entity and category.
    fn latest_balance(&self, entity_id: EntityId, category: BillCategory) -> impl Future<Output = Result<Option<Decimal>>> + Send;

    /// Adjust a single counter.
    fn adjust(&self, mutation: Mutation) -> impl Future<Output = Result<Outcome>> + Send {
        async move {
            let mut applied = self.apply(Change::new().with_mutation(mutation)).await?;
            applied.outcomes.pop().ok_or_else(|| Error::Internal {
                operation: "read adjustment outcome".to_string(),
            })
        }
    }

    /// Append a bill whose balance was computed by the caller.
    fn record(&self, request: LedgerEntryCreateDBRequest) -> impl Future<Output = Result<LedgerEntryDBResponse>> + Send {
        async move {
            let mut applied = self.apply(Change::new().with_bill(request.into())).await?;
            applied.entries.pop().ok_or_else(|| Error::Internal {
                operation: "read recorded bill".to_string(),
            })
        }
    }
}
