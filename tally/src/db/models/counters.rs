//! Database models for counters and counter mutations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::models::products::ProductKind;
use crate::types::{MerchantId, ProductId, Uid};

/// A numeric column on an entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Stock,
    Sales,
    NowMoney,
    Integral,
    BrokeragePrice,
    CareCount,
    Margin,
}

impl Counter {
    /// Column name. Only ever interpolated into SQL from this fixed set.
    pub fn column(&self) -> &'static str {
        match self {
            Counter::Stock => "stock",
            Counter::Sales => "sales",
            Counter::NowMoney => "now_money",
            Counter::Integral => "integral",
            Counter::BrokeragePrice => "brokerage_price",
            Counter::CareCount => "care_count",
            Counter::Margin => "margin",
        }
    }

    /// Maximum number of decimal places a delta may carry
    pub fn scale(&self) -> u32 {
        match self {
            Counter::Stock | Counter::Sales | Counter::CareCount | Counter::Integral => 0,
            Counter::NowMoney | Counter::BrokeragePrice | Counter::Margin => 2,
        }
    }

    /// User-facing text for a guarded decrement that would underflow
    pub fn shortfall_message(&self) -> &'static str {
        match self {
            Counter::Stock => "Insufficient stock",
            Counter::Sales => "Insufficient sales",
            Counter::NowMoney => "Insufficient balance",
            Counter::Integral => "Insufficient integral",
            Counter::BrokeragePrice => "Insufficient brokerage",
            Counter::CareCount => "Insufficient care count",
            Counter::Margin => "Insufficient margin",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Tables that own counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterTable {
    Products,
    ProductSkus,
    Users,
    Merchants,
}

impl CounterTable {
    pub fn name(&self) -> &'static str {
        match self {
            CounterTable::Products => "products",
            CounterTable::ProductSkus => "product_skus",
            CounterTable::Users => "users",
            CounterTable::Merchants => "merchants",
        }
    }

    /// Counters stored as columns of this table
    pub fn counters(&self) -> &'static [Counter] {
        match self {
            CounterTable::Products => &[Counter::Stock, Counter::Sales, Counter::CareCount],
            CounterTable::ProductSkus => &[Counter::Stock, Counter::Sales],
            CounterTable::Users => &[Counter::NowMoney, Counter::Integral, Counter::BrokeragePrice],
            CounterTable::Merchants => &[Counter::Margin, Counter::CareCount],
        }
    }

    pub fn supports(&self, counter: Counter) -> bool {
        self.counters().contains(&counter)
    }
}

impl fmt::Display for CounterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality predicate value in an entity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    BigInt(i64),
    SmallInt(i16),
    Text(String),
}

/// Identifies the row whose counters are adjusted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EntityKey {
    Product {
        product_id: ProductId,
    },
    Sku {
        kind: ProductKind,
        product_id: ProductId,
        unique: String,
    },
    User {
        uid: Uid,
    },
    Merchant {
        mer_id: MerchantId,
    },
}

impl EntityKey {
    pub fn sku(kind: ProductKind, product_id: ProductId, unique: impl Into<String>) -> Self {
        EntityKey::Sku {
            kind,
            product_id,
            unique: unique.into(),
        }
    }

    pub fn table(&self) -> CounterTable {
        match self {
            EntityKey::Product { .. } => CounterTable::Products,
            EntityKey::Sku { .. } => CounterTable::ProductSkus,
            EntityKey::User { .. } => CounterTable::Users,
            EntityKey::Merchant { .. } => CounterTable::Merchants,
        }
    }

    /// Equality predicates selecting the row, in primary key order
    pub fn predicates(&self) -> Vec<(&'static str, KeyValue)> {
        match self {
            EntityKey::Product { product_id } => vec![("id", KeyValue::BigInt(*product_id))],
            EntityKey::Sku { kind, product_id, unique } => vec![
                ("product_id", KeyValue::BigInt(*product_id)),
                ("product_type", KeyValue::SmallInt(kind.code())),
                ("activity_id", KeyValue::BigInt(kind.activity_id())),
                ("sku_unique", KeyValue::Text(unique.clone())),
            ],
            EntityKey::User { uid } => vec![("uid", KeyValue::BigInt(*uid))],
            EntityKey::Merchant { mer_id } => vec![("mer_id", KeyValue::BigInt(*mer_id))],
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Product { product_id } => write!(f, "product {product_id}"),
            EntityKey::Sku { kind, product_id, unique } => write!(f, "sku {product_id}/{unique} ({kind})"),
            EntityKey::User { uid } => write!(f, "user {uid}"),
            EntityKey::Merchant { mer_id } => write!(f, "merchant {mer_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    Plus,
    Minus,
}

/// What to do when a decrement would take the counter below zero.
///
/// Guards only apply to decrements; increments are never bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Fail the whole unit of work
    Reject,
    /// Leave this counter unchanged and carry on
    Skip,
    /// Apply anyway, the counter may go negative
    Unchecked,
}

/// A single counter adjustment: `counter = counter ± delta` on the row selected by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub key: EntityKey,
    pub counter: Counter,
    pub delta: Decimal,
    pub sign: Sign,
    pub guard: Guard,
}

impl Mutation {
    pub fn increment(key: EntityKey, counter: Counter, delta: Decimal) -> Self {
        Self {
            key,
            counter,
            delta,
            sign: Sign::Plus,
            guard: Guard::Reject,
        }
    }

    pub fn decrement(key: EntityKey, counter: Counter, delta: Decimal, guard: Guard) -> Self {
        Self {
            key,
            counter,
            delta,
            sign: Sign::Minus,
            guard,
        }
    }

    /// The delta with the sign applied
    pub fn signed_delta(&self) -> Decimal {
        match self.sign {
            Sign::Plus => self.delta,
            Sign::Minus => -self.delta,
        }
    }

    /// Whether the underflow guard has to be evaluated for this mutation
    pub fn is_guarded(&self) -> bool {
        self.sign == Sign::Minus && self.guard != Guard::Unchecked
    }
}

/// Result of a single mutation inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The counter was changed and now holds `value`
    Applied { value: Decimal },
    /// A `Guard::Skip` decrement was not applied; the counter still holds `value`
    Skipped { value: Decimal },
}

impl Outcome {
    pub fn value(&self) -> Decimal {
        match *self {
            Outcome::Applied { value } | Outcome::Skipped { value } => value,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_own_expected_counters() {
        assert!(CounterTable::ProductSkus.supports(Counter::Stock));
        assert!(!CounterTable::ProductSkus.supports(Counter::NowMoney));
        assert!(CounterTable::Merchants.supports(Counter::Margin));
        assert!(!CounterTable::Users.supports(Counter::Margin));
    }

    #[test]
    fn test_sku_predicates_include_kind() {
        let key = EntityKey::sku(ProductKind::Seckill { activity_id: 9 }, 42, "red-xl");
        let predicates = key.predicates();
        assert_eq!(predicates.len(), 4);
        assert_eq!(predicates[1], ("product_type", KeyValue::SmallInt(1)));
        assert_eq!(predicates[2], ("activity_id", KeyValue::BigInt(9)));
        assert_eq!(predicates[3], ("sku_unique", KeyValue::Text("red-xl".to_string())));
    }

    #[test]
    fn test_signed_delta_and_guarding() {
        let key = EntityKey::User { uid: 1 };
        let up = Mutation::increment(key.clone(), Counter::NowMoney, Decimal::new(150, 2));
        assert_eq!(up.signed_delta(), Decimal::new(150, 2));
        assert!(!up.is_guarded());

        let down = Mutation::decrement(key.clone(), Counter::NowMoney, Decimal::new(150, 2), Guard::Skip);
        assert_eq!(down.signed_delta(), Decimal::new(-150, 2));
        assert!(down.is_guarded());

        let loose = Mutation::decrement(key, Counter::NowMoney, Decimal::ONE, Guard::Unchecked);
        assert!(!loose.is_guarded());
    }
}
