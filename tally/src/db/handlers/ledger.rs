//! Database repository for ledger entries.
//!
//! The ledger is append-only: entries are inserted next to the counter change they describe and
//! are never updated or deleted. The [`Repository`] implementation refuses both.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::ledger::{BillCategory, LedgerEntryCreateDBRequest, LedgerEntryDBResponse, LedgerFilter},
};
use crate::types::{EntityId, LedgerEntryId, Operation};

const LEDGER_COLUMNS: &str = "id, entity_id, category, direction, bill_type, amount, balance, title, mark, link_id, created_at";

// Database entity model for a ledger entry
#[derive(Debug, Clone, FromRow)]
struct LedgerRow {
    pub id: LedgerEntryId,
    pub entity_id: EntityId,
    pub category: String,
    pub direction: String,
    pub bill_type: String,
    pub amount: Decimal,
    pub balance: Decimal,
    pub title: String,
    pub mark: String,
    pub link_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntryDBResponse {
    type Error = DbError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            entity_id: row.entity_id,
            category: row.category.parse().map_err(|e: String| DbError::Other(anyhow::anyhow!(e)))?,
            direction: row.direction.parse().map_err(|e: String| DbError::Other(anyhow::anyhow!(e)))?,
            bill_type: row.bill_type,
            amount: row.amount,
            balance: row.balance,
            title: row.title,
            mark: row.mark,
            link_id: row.link_id,
            created_at: row.created_at,
        })
    }
}

fn into_responses(rows: Vec<LedgerRow>) -> Result<Vec<LedgerEntryDBResponse>> {
    rows.into_iter().map(LedgerEntryDBResponse::try_from).collect()
}

fn append_only(operation: Operation, id: LedgerEntryId) -> DbError {
    DbError::ProtectedEntity {
        operation,
        reason: "ledger entries are append-only".to_string(),
        entity_type: "ledger entry".to_string(),
        entity_id: Some(id.to_string()),
    }
}

pub struct Ledger<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Ledger<'c> {
    /// Create a new Ledger repository instance
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append a ledger entry. The balance is stored exactly as given.
    #[instrument(skip(self, request), fields(entity_id = request.entity_id, category = %request.category, direction = %request.direction, amount = %request.amount), err)]
    pub async fn record(&mut self, request: &LedgerEntryCreateDBRequest) -> Result<LedgerEntryDBResponse> {
        let sql = format!(
            r#"
            INSERT INTO ledger_entries (entity_id, category, direction, bill_type, amount, balance, title, mark, link_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {LEDGER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(request.entity_id)
            .bind(request.category.as_str())
            .bind(request.direction.as_str())
            .bind(&request.bill_type)
            .bind(request.amount)
            .bind(request.balance)
            .bind(&request.title)
            .bind(&request.mark)
            .bind(&request.link_id)
            .fetch_one(&mut *self.db)
            .await?;

        LedgerEntryDBResponse::try_from(row)
    }

    /// Get a single entry
    #[instrument(skip(self), err)]
    pub async fn get(&mut self, id: LedgerEntryId) -> Result<Option<LedgerEntryDBResponse>> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = $1");
        let row = sqlx::query_as::<_, LedgerRow>(&sql).bind(id).fetch_optional(&mut *self.db).await?;
        row.map(LedgerEntryDBResponse::try_from).transpose()
    }

    /// Balance snapshot of the most recent entry for an entity and category
    #[instrument(skip(self, category), fields(category = %category), err)]
    pub async fn latest_balance(&mut self, entity_id: EntityId, category: BillCategory) -> Result<Option<Decimal>> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT balance
            FROM ledger_entries
            WHERE entity_id = $1 AND category = $2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(category.as_str())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(balance)
    }

    /// List entries matching the filter, newest first
    #[instrument(skip(self, filter), fields(entity_id = ?filter.entity_id, skip = filter.skip, limit = filter.limit), err)]
    pub async fn search(&mut self, filter: &LedgerFilter) -> Result<Vec<LedgerEntryDBResponse>> {
        let mut query = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE TRUE");
        let mut param_count = 0;

        if filter.entity_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND entity_id = ${param_count}"));
        }
        if filter.category.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND category = ${param_count}"));
        }
        if filter.direction.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND direction = ${param_count}"));
        }
        if filter.bill_type.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND bill_type = ${param_count}"));
        }
        if filter.link_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND link_id = ${param_count}"));
        }
        if filter.since.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if filter.until.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        query.push_str(&format!(
            " ORDER BY id DESC OFFSET ${} LIMIT ${}",
            param_count + 1,
            param_count + 2
        ));

        let mut sql_query = sqlx::query_as::<_, LedgerRow>(&query);
        if let Some(entity_id) = filter.entity_id {
            sql_query = sql_query.bind(entity_id);
        }
        if let Some(category) = filter.category {
            sql_query = sql_query.bind(category.as_str());
        }
        if let Some(direction) = filter.direction {
            sql_query = sql_query.bind(direction.as_str());
        }
        if let Some(bill_type) = &filter.bill_type {
            sql_query = sql_query.bind(bill_type);
        }
        if let Some(link_id) = &filter.link_id {
            sql_query = sql_query.bind(link_id);
        }
        if let Some(since) = filter.since {
            sql_query = sql_query.bind(since);
        }
        if let Some(until) = filter.until {
            sql_query = sql_query.bind(until);
        }

        let rows = sql_query.bind(filter.skip).bind(filter.limit).fetch_all(&mut *self.db).await?;
        into_responses(rows)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Ledger<'c> {
    type CreateRequest = LedgerEntryCreateDBRequest;
    type UpdateRequest = ();
    type Response = LedgerEntryDBResponse;
    type Id = LedgerEntryId;
    type Filter = LedgerFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        self.record(request).await
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        self.get(id).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, LedgerRow>(&sql).bind(&ids).fetch_all(&mut *self.db).await?;

        Ok(into_responses(rows)?.into_iter().map(|entry| (entry.id, entry)).collect())
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        self.search(filter).await
    }

    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        Err(append_only(Operation::Delete, id))
    }

    async fn update(&mut self, id: Self::Id, _request: &Self::UpdateRequest) -> Result<Self::Response> {
        Err(append_only(Operation::Update, id))
    }
}
