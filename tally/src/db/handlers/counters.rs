//! Database repository for counters stored as columns on entity rows.
//!
//! All writes are single conditional `UPDATE ... RETURNING` statements so that concurrent
//! writers never lose updates. Table and column names come from [`CounterTable`] and
//! [`Counter`], never from callers.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryScalar};
use sqlx::{PgConnection, Postgres, Row};
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::counters::{Counter, EntityKey, KeyValue, Mutation},
};

pub struct Counters<'c> {
    db: &'c mut PgConnection,
}

/// Build `a = $n AND b = $n+1 ...` for the key, numbering parameters from `first_param`.
fn key_predicate(key: &EntityKey, first_param: usize) -> (String, Vec<KeyValue>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for (i, (column, value)) in key.predicates().into_iter().enumerate() {
        clauses.push(format!("{} = ${}", column, first_param + i));
        values.push(value);
    }
    (clauses.join(" AND "), values)
}

fn bind_scalar<'q>(
    query: QueryScalar<'q, Postgres, Decimal, PgArguments>,
    value: KeyValue,
) -> QueryScalar<'q, Postgres, Decimal, PgArguments> {
    match value {
        KeyValue::BigInt(v) => query.bind(v),
        KeyValue::SmallInt(v) => query.bind(v),
        KeyValue::Text(v) => query.bind(v),
    }
}

fn bind_query<'q>(query: Query<'q, Postgres, PgArguments>, value: KeyValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        KeyValue::BigInt(v) => query.bind(v),
        KeyValue::SmallInt(v) => query.bind(v),
        KeyValue::Text(v) => query.bind(v),
    }
}

impl<'c> Counters<'c> {
    /// Create a new Counters repository instance
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Apply `counter = counter ± delta` atomically.
    ///
    /// Guarded decrements carry `AND counter - delta >= 0` in the same statement. Returns the
    /// new value, or `None` when no row matched (missing row or guard not satisfied); callers
    /// tell the two apart with [`Counters::get`].
    #[instrument(skip(self, mutation), fields(key = %mutation.key, counter = %mutation.counter, delta = %mutation.signed_delta()), err)]
    pub async fn adjust(&mut self, mutation: &Mutation) -> Result<Option<Decimal>> {
        let table = mutation.key.table();
        let column = mutation.counter.column();
        let (predicate, values) = key_predicate(&mutation.key, 2);

        let guard = if mutation.is_guarded() {
            format!(" AND {column} + $1 >= 0")
        } else {
            String::new()
        };

        let sql = format!(
            "UPDATE {table} SET {column} = {column} + $1, updated_at = NOW() WHERE {predicate}{guard} RETURNING {column}",
            table = table.name(),
        );

        let mut query = sqlx::query_scalar::<_, Decimal>(&sql).bind(mutation.signed_delta());
        for value in values {
            query = bind_scalar(query, value);
        }

        let value = query.fetch_optional(&mut *self.db).await?;
        Ok(value)
    }

    /// Current value of one counter, `None` if the row does not exist
    #[instrument(skip(self, key, counter), fields(key = %key, counter = %counter), err)]
    pub async fn get(&mut self, key: &EntityKey, counter: Counter) -> Result<Option<Decimal>> {
        let (predicate, values) = key_predicate(key, 1);
        let sql = format!(
            "SELECT {column} FROM {table} WHERE {predicate}",
            column = counter.column(),
            table = key.table().name(),
        );

        let mut query = sqlx::query_scalar::<_, Decimal>(&sql);
        for value in values {
            query = bind_scalar(query, value);
        }

        let value = query.fetch_optional(&mut *self.db).await?;
        Ok(value)
    }

    /// All counters of the row, `None` if the row does not exist
    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn snapshot(&mut self, key: &EntityKey) -> Result<Option<HashMap<Counter, Decimal>>> {
        let table = key.table();
        let columns: Vec<&str> = table.counters().iter().map(|c| c.column()).collect();
        let (predicate, values) = key_predicate(key, 1);
        let sql = format!("SELECT {} FROM {} WHERE {predicate}", columns.join(", "), table.name());

        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_query(query, value);
        }

        let row: Option<PgRow> = query.fetch_optional(&mut *self.db).await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut snapshot = HashMap::new();
        for counter in table.counters() {
            let value: Decimal = row.try_get(counter.column())?;
            snapshot.insert(*counter, value);
        }
        Ok(Some(snapshot))
    }

    /// Create the row with all counters at zero if it does not exist yet.
    ///
    /// Returns true if a row was created.
    #[instrument(skip(self, key), fields(key = %key), err)]
    pub async fn ensure(&mut self, key: &EntityKey) -> Result<bool> {
        let predicates = key.predicates();
        let columns: Vec<&str> = predicates.iter().map(|(column, _)| *column).collect();
        let placeholders: Vec<String> = (1..=predicates.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            key.table().name(),
            columns.join(", "),
            placeholders.join(", "),
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in predicates {
            query = bind_query(query, value);
        }

        let result = query.execute(&mut *self.db).await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::products::ProductKind;

    #[test]
    fn test_key_predicate_numbers_parameters() {
        let key = EntityKey::sku(ProductKind::Presell { activity_id: 5 }, 10, "blue");
        let (predicate, values) = key_predicate(&key, 2);
        assert_eq!(predicate, "product_id = $2 AND product_type = $3 AND activity_id = $4 AND sku_unique = $5");
        assert_eq!(values.len(), 4);

        let (predicate, _) = key_predicate(&EntityKey::User { uid: 3 }, 1);
        assert_eq!(predicate, "uid = $1");
    }

    #[cfg(feature = "postgres-tests")]
    mod postgres {
        use super::*;
        use sqlx::PgPool;

        #[sqlx::test]
        #[test_log::test]
        async fn test_guarded_decrement_stops_at_zero(pool: PgPool) {
            let mut conn = pool.acquire().await.unwrap();
            let mut repo = Counters::new(&mut conn);
            let key = EntityKey::sku(ProductKind::Ordinary, 1, "sku1");

            assert!(repo.ensure(&key).await.unwrap());
            assert!(!repo.ensure(&key).await.unwrap());

            let up = Mutation::increment(key.clone(), Counter::Stock, Decimal::from(2));
            assert_eq!(repo.adjust(&up).await.unwrap(), Some(Decimal::from(2)));

            let down = Mutation::decrement(key.clone(), Counter::Stock, Decimal::from(3), crate::db::models::counters::Guard::Reject);
            assert_eq!(repo.adjust(&down).await.unwrap(), None);
            assert_eq!(repo.get(&key, Counter::Stock).await.unwrap(), Some(Decimal::from(2)));

            let loose = Mutation::decrement(key.clone(), Counter::Stock, Decimal::from(3), crate::db::models::counters::Guard::Unchecked);
            assert_eq!(repo.adjust(&loose).await.unwrap(), Some(Decimal::from(-1)));
        }

        #[sqlx::test]
        #[test_log::test]
        async fn test_missing_row_is_none(pool: PgPool) {
            let mut conn = pool.acquire().await.unwrap();
            let mut repo = Counters::new(&mut conn);
            let key = EntityKey::User { uid: 404 };

            let up = Mutation::increment(key.clone(), Counter::NowMoney, Decimal::ONE);
            assert_eq!(repo.adjust(&up).await.unwrap(), None);
            assert_eq!(repo.get(&key, Counter::NowMoney).await.unwrap(), None);
            assert!(repo.snapshot(&key).await.unwrap().is_none());
        }
    }
}
