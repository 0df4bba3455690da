//! Database models for ledger entries (bills).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::models::counters::{Counter, EntityKey, Sign};
use crate::errors::Error;
use crate::types::{EntityId, LedgerEntryId};

/// Which balance a bill belongs to, stored as TEXT in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillCategory {
    NowMoney,
    Integral,
    Brokerage,
    Margin,
}

impl BillCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillCategory::NowMoney => "now_money",
            BillCategory::Integral => "integral",
            BillCategory::Brokerage => "brokerage",
            BillCategory::Margin => "margin",
        }
    }

    /// The counter holding this category's balance
    pub fn counter(&self) -> Counter {
        match self {
            BillCategory::NowMoney => Counter::NowMoney,
            BillCategory::Integral => Counter::Integral,
            BillCategory::Brokerage => Counter::BrokeragePrice,
            BillCategory::Margin => Counter::Margin,
        }
    }

    /// The row holding this category's balance for `entity_id`
    pub fn entity_key(&self, entity_id: EntityId) -> EntityKey {
        match self {
            BillCategory::Margin => EntityKey::Merchant { mer_id: entity_id },
            _ => EntityKey::User { uid: entity_id },
        }
    }
}

impl fmt::Display for BillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now_money" => Ok(BillCategory::NowMoney),
            "integral" => Ok(BillCategory::Integral),
            "brokerage" => Ok(BillCategory::Brokerage),
            "margin" => Ok(BillCategory::Margin),
            other => Err(format!("unknown bill category '{other}'")),
        }
    }
}

/// Whether a bill added to or took from the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    pub fn sign(&self) -> Sign {
        match self {
            Direction::Credit => Sign::Plus,
            Direction::Debit => Sign::Minus,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown bill direction '{other}'")),
        }
    }
}

/// Database request for appending a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntryCreateDBRequest {
    pub entity_id: EntityId,
    pub category: BillCategory,
    pub direction: Direction,
    pub bill_type: String,
    pub amount: Decimal,
    /// Balance snapshot after the change this entry describes
    pub balance: Decimal,
    pub title: String,
    pub mark: String,
    /// Id of the object that caused the change (order, admin action), not enforced
    pub link_id: Option<String>,
}

/// Database response for a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryDBResponse {
    pub id: LedgerEntryId,
    pub entity_id: EntityId,
    pub category: BillCategory,
    pub direction: Direction,
    pub bill_type: String,
    pub amount: Decimal,
    pub balance: Decimal,
    pub title: String,
    pub mark: String,
    pub link_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing ledger entries. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub entity_id: Option<EntityId>,
    pub category: Option<BillCategory>,
    pub direction: Option<Direction>,
    pub bill_type: Option<String>,
    pub link_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub skip: i64,
    pub limit: i64,
}

impl LedgerFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    pub fn for_entity(entity_id: EntityId, category: BillCategory) -> Self {
        Self {
            entity_id: Some(entity_id),
            category: Some(category),
            limit: 20,
            ..Default::default()
        }
    }

    /// Skip and limit must not be negative
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.skip < 0 || self.limit < 0 {
            return Err(Error::BadRequest {
                message: format!("skip and limit must not be negative (skip {}, limit {})", self.skip, self.limit),
            });
        }
        Ok(())
    }

    pub fn matches(&self, entry: &LedgerEntryDBResponse) -> bool {
        self.entity_id.is_none_or(|id| entry.entity_id == id)
            && self.category.is_none_or(|c| entry.category == c)
            && self.direction.is_none_or(|d| entry.direction == d)
            && self.bill_type.as_deref().is_none_or(|t| entry.bill_type == t)
            && self.link_id.as_deref().is_none_or(|l| entry.link_id.as_deref() == Some(l))
            && self.since.is_none_or(|s| entry.created_at >= s)
            && self.until.is_none_or(|u| entry.created_at <= u)
    }
}
