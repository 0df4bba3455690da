//! Common type definitions.
//!
//! Entity identifiers are plain integers wrapped in type aliases so signatures say which row
//! they point at:
//!
//! - [`ProductId`]: product (SPU) identifier
//! - [`ActivityId`]: seckill/presell/assist/group activity identifier
//! - [`Uid`]: user identifier
//! - [`MerchantId`]: merchant identifier
//! - [`LedgerEntryId`]: bill identifier

use serde::{Deserialize, Serialize};
use std::fmt;

pub type EntityId = i64;
pub type ProductId = i64;
pub type ActivityId = i64;
pub type Uid = i64;
pub type MerchantId = i64;
pub type LedgerEntryId = i64;

/// Mutating operations that can be refused by protection rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}
