//! PostgreSQL implementation of the record store.
//!
//! Rows are read as `to_jsonb(row)` so one code path serves every entity
//! type; adapters pick the columns they need out of the JSON object.

use async_trait::async_trait;
use search_sync_shared::{EntityType, RecordId, SourceRecord};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Uuid, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::RecordStoreError;
use crate::interfaces::RecordStore;
use crate::types::{value_as_text, FieldFilter, FilterOp};
use crate::utils::is_safe_identifier;

/// PostgreSQL-backed record store.
///
/// Each entity type maps to one table whose primary key column is `id`.
pub struct PostgresRecordStore {
    pool: PgPool,
    tables: HashMap<EntityType, String>,
}

impl PostgresRecordStore {
    /// Connect a new pool and use the default table names.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RecordStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!(max_connections = max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Wrap an existing pool, using the default table names.
    pub fn new(pool: PgPool) -> Self {
        let tables = EntityType::ALL
            .iter()
            .map(|t| (*t, Self::default_table(*t).to_string()))
            .collect();
        Self { pool, tables }
    }

    /// Point an entity type at a different table.
    pub fn with_table(
        mut self,
        entity_type: EntityType,
        table: impl Into<String>,
    ) -> Result<Self, RecordStoreError> {
        let table = table.into();
        if !is_safe_identifier(&table) {
            return Err(RecordStoreError::UnsafeIdentifier(table));
        }
        self.tables.insert(entity_type, table);
        Ok(self)
    }

    pub fn default_table(entity_type: EntityType) -> &'static str {
        match entity_type {
            EntityType::Article => "articles",
            EntityType::User => "users",
            EntityType::Tag => "tags",
            EntityType::Reaction => "reactions",
        }
    }

    fn table(&self, entity_type: EntityType) -> &str {
        self.tables
            .get(&entity_type)
            .map(String::as_str)
            .unwrap_or_else(|| Self::default_table(entity_type))
    }

    fn row_to_record(entity_type: EntityType, row: Value) -> Result<SourceRecord, RecordStoreError> {
        let fields = match row {
            Value::Object(fields) => fields,
            other => {
                return Err(RecordStoreError::decode(format!(
                    "expected a JSON object row, got {}",
                    other
                )))
            }
        };
        let id = fields
            .get("id")
            .and_then(RecordId::from_json)
            .ok_or_else(|| RecordStoreError::decode("row has no usable id column"))?;

        Ok(SourceRecord {
            id,
            entity_type,
            fields,
        })
    }

    /// Lookup of one row by primary key. The id is bound in its native type so
    /// the primary key index is used.
    fn select_by_id_sql(table: &str) -> String {
        format!("SELECT to_jsonb(t) AS record FROM {} t WHERE t.id = $1", table)
    }

    fn select_by_ids_sql(table: &str) -> String {
        format!("SELECT to_jsonb(t) AS record FROM {} t WHERE t.id = ANY($1)", table)
    }

    /// Split ids by kind. A table has a single id type, so at most one of the
    /// two lists matches anything.
    fn partition_ids(ids: &[RecordId]) -> (Vec<i64>, Vec<Uuid>) {
        let mut ints = Vec::new();
        let mut uuids = Vec::new();
        for id in ids {
            match id {
                RecordId::Int(n) => ints.push(*n),
                RecordId::Uuid(u) => uuids.push(*u),
            }
        }
        (ints, uuids)
    }

    async fn fetch_records(
        &self,
        entity_type: EntityType,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<SourceRecord>, RecordStoreError> {
        let rows = query.fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Value = row.try_get("record")?;
            records.push(Self::row_to_record(entity_type, value)?);
        }
        Ok(records)
    }

    /// Append ` AND <condition>` for one filter, binding its value.
    fn push_filter(
        builder: &mut QueryBuilder<'_, Postgres>,
        filter: &FieldFilter,
    ) -> Result<(), RecordStoreError> {
        if !is_safe_identifier(&filter.field) {
            return Err(RecordStoreError::UnsafeIdentifier(filter.field.clone()));
        }

        builder.push(" AND ");
        match &filter.op {
            FilterOp::Equals(value) => {
                builder.push(format!("t.{}::text = ", filter.field));
                builder.push_bind(value_as_text(value));
            }
            FilterOp::NotContaining(needle) => {
                builder.push(format!("COALESCE(t.{}::text, '') NOT ILIKE ", filter.field));
                builder.push_bind(format!("%{}%", needle));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &RecordId,
    ) -> Result<Option<SourceRecord>, RecordStoreError> {
        let sql = Self::select_by_id_sql(self.table(entity_type));
        let query = match id {
            RecordId::Int(n) => sqlx::query(&sql).bind(*n),
            RecordId::Uuid(u) => sqlx::query(&sql).bind(*u),
        };

        let row = query.fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let value: Value = row.try_get("record")?;
                Ok(Some(Self::row_to_record(entity_type, value)?))
            }
            None => Ok(None),
        }
    }

    async fn find_many_by_id(
        &self,
        entity_type: EntityType,
        ids: &[RecordId],
    ) -> Result<Vec<SourceRecord>, RecordStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = Self::select_by_ids_sql(self.table(entity_type));
        let (ints, uuids) = Self::partition_ids(ids);

        let mut records = Vec::with_capacity(ids.len());
        if !ints.is_empty() {
            records.extend(
                self.fetch_records(entity_type, sqlx::query(&sql).bind(ints))
                    .await?,
            );
        }
        if !uuids.is_empty() {
            records.extend(
                self.fetch_records(entity_type, sqlx::query(&sql).bind(uuids))
                    .await?,
            );
        }

        debug!(
            entity_type = %entity_type,
            requested = ids.len(),
            found = records.len(),
            "Eager-loaded records"
        );
        Ok(records)
    }

    /// Uses `pg_class.reltuples`; tables that were never analyzed report -1
    /// and yield `None`.
    async fn estimated_count(
        &self,
        entity_type: EntityType,
    ) -> Result<Option<u64>, RecordStoreError> {
        let row = sqlx::query(
            "SELECT reltuples::bigint AS estimate FROM pg_class WHERE oid = to_regclass($1)",
        )
        .bind(self.table(entity_type))
        .fetch_optional(&self.pool)
        .await?;

        let estimate = match row {
            Some(row) => row.try_get::<Option<i64>, _>("estimate")?,
            None => None,
        };

        Ok(estimate.filter(|n| *n >= 0).map(|n| n as u64))
    }

    async fn exact_count(&self, entity_type: EntityType) -> Result<u64, RecordStoreError> {
        let sql = format!("SELECT COUNT(*) AS total FROM {}", self.table(entity_type));
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn count_matching(
        &self,
        entity_type: EntityType,
        filters: &[FieldFilter],
    ) -> Result<u64, RecordStoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) AS total FROM {} t WHERE TRUE",
            self.table(entity_type)
        ));
        for filter in filters {
            Self::push_filter(&mut builder, filter)?;
        }

        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }
}
