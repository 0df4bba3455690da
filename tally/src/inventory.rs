//! Stock and sales bookkeeping for product SKUs.
//!
//! Every stock operation touches the SKU row and its product (SPU) row together, in one unit of
//! work:
//!
//! | operation    | SKU / SPU `stock` | SKU / SPU `sales`                          |
//! |--------------|-------------------|--------------------------------------------|
//! | `desc_stock` | `-num`, rejected if short | `+num`                             |
//! | `inc_stock`  | `+num`            | `-num` only while sales covers it (optional) |

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::config::InventoryConfig;
use crate::db::models::counters::{Counter, EntityKey, Guard, Mutation};
use crate::db::models::products::ProductKind;
use crate::errors::{Error, Result};
use crate::store::{Applied, Change, Store};
use crate::types::ProductId;

/// Stock and sales of one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub stock: Decimal,
    pub sales: Decimal,
}

pub struct Inventory<S> {
    store: S,
    config: InventoryConfig,
}

fn check_quantity(num: Decimal) -> Result<()> {
    if num <= Decimal::ZERO || !num.fract().is_zero() {
        return Err(Error::InvalidAmount {
            counter: Counter::Stock,
            amount: num,
            reason: "quantity must be a positive whole number",
        });
    }
    Ok(())
}

impl<S: Store> Inventory<S> {
    pub fn new(store: S, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    /// Sell `num` units: stock down, sales up, on both the SKU and its product.
    ///
    /// # Errors
    /// - `Insufficient` if either the SKU or the product has less than `num` in stock
    /// - `NotFound` if either row is missing
    #[instrument(skip(self, kind, unique), fields(kind = %kind, sku = unique), err)]
    pub async fn desc_stock(&self, kind: ProductKind, product_id: ProductId, unique: &str, num: Decimal) -> Result<Applied> {
        check_quantity(num)?;

        let sku = EntityKey::sku(kind, product_id, unique);
        let product = EntityKey::Product { product_id };

        let change = Change::new()
            .with_mutation(Mutation::decrement(sku.clone(), Counter::Stock, num, Guard::Reject))
            .with_mutation(Mutation::increment(sku, Counter::Sales, num))
            .with_mutation(Mutation::decrement(product.clone(), Counter::Stock, num, Guard::Reject))
            .with_mutation(Mutation::increment(product, Counter::Sales, num));

        let applied = self.store.apply(change).await?;
        tracing::info!(product_id, sku = unique, %num, "Stock taken");
        Ok(applied)
    }

    /// Return `num` units to stock on both the SKU and its product.
    ///
    /// With `clawback_sales_on_return` the same quantity is taken back out of `sales`, but only
    /// on rows whose sales cover it; rows with fewer sales keep them unchanged.
    #[instrument(skip(self, kind, unique), fields(kind = %kind, sku = unique), err)]
    pub async fn inc_stock(&self, kind: ProductKind, product_id: ProductId, unique: &str, num: Decimal) -> Result<Applied> {
        check_quantity(num)?;

        let sku = EntityKey::sku(kind, product_id, unique);
        let product = EntityKey::Product { product_id };

        let mut change = Change::new();
        for key in [sku, product] {
            change = change.with_mutation(Mutation::increment(key.clone(), Counter::Stock, num));
            if self.config.clawback_sales_on_return {
                change = change.with_mutation(Mutation::decrement(key, Counter::Sales, num, Guard::Skip));
            }
        }

        let applied = self.store.apply(change).await?;
        let skipped = applied.outcomes.iter().filter(|outcome| !outcome.is_applied()).count();
        tracing::info!(product_id, sku = unique, %num, skipped_clawbacks = skipped, "Stock returned");
        Ok(applied)
    }

    /// Current stock and sales of a SKU
    pub async fn stock(&self, kind: ProductKind, product_id: ProductId, unique: &str) -> Result<StockLevel> {
        self.level(&EntityKey::sku(kind, product_id, unique)).await
    }

    /// Current stock and sales of a product across all its SKUs
    pub async fn product_stock(&self, product_id: ProductId) -> Result<StockLevel> {
        self.level(&EntityKey::Product { product_id }).await
    }

    async fn level(&self, key: &EntityKey) -> Result<StockLevel> {
        let snapshot = self.store.snapshot(key).await?;
        Ok(StockLevel {
            stock: snapshot.get(&Counter::Stock).copied().unwrap_or_default(),
            sales: snapshot.get(&Counter::Sales).copied().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryStore;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn inventory(clawback: bool) -> Inventory<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert_row(EntityKey::sku(ProductKind::Ordinary, 1, "sku1"), &[(Counter::Stock, d(10))]);
        store.insert_row(EntityKey::Product { product_id: 1 }, &[(Counter::Stock, d(30))]);
        Inventory::new(
            store,
            InventoryConfig {
                clawback_sales_on_return: clawback,
            },
        )
    }

    #[tokio::test]
    async fn test_desc_then_inc_stock() {
        let inventory = inventory(true);

        inventory.desc_stock(ProductKind::Ordinary, 1, "sku1", d(3)).await.unwrap();
        let level = inventory.stock(ProductKind::Ordinary, 1, "sku1").await.unwrap();
        assert_eq!(level, StockLevel { stock: d(7), sales: d(3) });
        assert_eq!(inventory.product_stock(1).await.unwrap(), StockLevel { stock: d(27), sales: d(3) });

        inventory.inc_stock(ProductKind::Ordinary, 1, "sku1", d(2)).await.unwrap();
        let level = inventory.stock(ProductKind::Ordinary, 1, "sku1").await.unwrap();
        assert_eq!(level, StockLevel { stock: d(9), sales: d(1) });

        // Sales only go down while they cover the returned quantity
        let applied = inventory.inc_stock(ProductKind::Ordinary, 1, "sku1", d(4)).await.unwrap();
        assert_eq!(applied.outcomes.iter().filter(|o| o.is_applied()).count(), 2);
        let level = inventory.stock(ProductKind::Ordinary, 1, "sku1").await.unwrap();
        assert_eq!(level, StockLevel { stock: d(13), sales: d(1) });
    }

    #[tokio::test]
    async fn test_inc_stock_without_clawback() {
        let inventory = inventory(false);

        inventory.desc_stock(ProductKind::Ordinary, 1, "sku1", d(3)).await.unwrap();
        let applied = inventory.inc_stock(ProductKind::Ordinary, 1, "sku1", d(2)).await.unwrap();
        assert_eq!(applied.outcomes.len(), 2);

        let level = inventory.stock(ProductKind::Ordinary, 1, "sku1").await.unwrap();
        assert_eq!(level, StockLevel { stock: d(9), sales: d(3) });
    }

    #[tokio::test]
    async fn test_oversell_changes_nothing() {
        let inventory = inventory(true);

        let err = inventory.desc_stock(ProductKind::Ordinary, 1, "sku1", d(11)).await.unwrap_err();
        assert!(matches!(err, Error::Insufficient { counter: Counter::Stock, .. }));
        assert_eq!(err.user_message(), "Insufficient stock");

        let level = inventory.stock(ProductKind::Ordinary, 1, "sku1").await.unwrap();
        assert_eq!(level, StockLevel { stock: d(10), sales: d(0) });
        assert_eq!(inventory.product_stock(1).await.unwrap(), StockLevel { stock: d(30), sales: d(0) });
    }

    #[tokio::test]
    async fn test_activity_skus_are_separate_rows() {
        let inventory = inventory(true);
        let seckill = ProductKind::Seckill { activity_id: 4 };

        let err = inventory.desc_stock(seckill, 1, "sku1", d(1)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_quantity_must_be_positive_whole_number() {
        let inventory = inventory(true);

        for num in [d(0), d(-2), Decimal::new(15, 1)] {
            let err = inventory.desc_stock(ProductKind::Ordinary, 1, "sku1", num).await.unwrap_err();
            assert!(matches!(err, Error::InvalidAmount { .. }), "{num} should be rejected");
        }
    }
}
