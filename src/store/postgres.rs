//! PostgreSQL persistence. Every statement returns rows as one JSONB column named `row`.

use super::Persistence;
use crate::config::{ModelConfig, ModelRegistry, RelationsConfig};
use crate::error::AppError;
use crate::query::{Predicate, Query};
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;

pub struct PgStore {
    pool: PgPool,
    /// Resolves include targets to their tables.
    registry: Arc<ModelRegistry>,
}

impl PgStore {
    pub fn new(pool: PgPool, registry: Arc<ModelRegistry>) -> Self {
        PgStore { pool, registry }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "connected to database");
        Ok(Self::new(pool, registry))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_db_error)?;
        rows.iter().map(row_json).collect()
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let row = query.fetch_optional(&self.pool).await.map_err(map_db_error)?;
        row.as_ref().map(row_json).transpose()
    }
}

fn row_json(row: &PgRow) -> Result<Value, AppError> {
    Ok(row.try_get::<Value, _>("row")?)
}

/// Constraint violations are the caller's fault, not the server's.
fn map_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("23505") => return AppError::Conflict(db.message().to_string()),
            Some("23502") | Some("23503") | Some("22P02") | Some("22007") => {
                return AppError::BadRequest(db.message().to_string())
            }
            _ => {}
        }
    }
    AppError::Db(e)
}

fn object(model: &ModelConfig, data: Value) -> Result<serde_json::Map<String, Value>, AppError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest(format!("{} payload must be a JSON object", model.name))),
    }
}

#[async_trait]
impl Persistence for PgStore {
    async fn find_many(&self, model: &ModelConfig, query: &Query) -> Result<Vec<Value>, AppError> {
        let q = sql::select_many(model, &self.registry, query);
        self.fetch_all(&q).await
    }

    async fn count(&self, model: &ModelConfig, filter: Option<&Predicate>) -> Result<u64, AppError> {
        let q = sql::count(model, filter);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let n = query.fetch_one(&self.pool).await.map_err(map_db_error)?;
        Ok(n.max(0) as u64)
    }

    async fn find_unique(
        &self,
        model: &ModelConfig,
        id: &Value,
        relations: &RelationsConfig,
    ) -> Result<Option<Value>, AppError> {
        let q = sql::select_by_id(
            model,
            &self.registry,
            id,
            relations.select.as_deref(),
            &relations.include,
        );
        self.fetch_optional(&q).await
    }

    async fn create(&self, model: &ModelConfig, data: Value) -> Result<Value, AppError> {
        let q = sql::insert(model, &object(model, data)?);
        self.fetch_optional(&q)
            .await?
            .ok_or_else(|| AppError::Store(format!("insert into {} returned no row", model.table_name())))
    }

    async fn update(&self, model: &ModelConfig, id: &Value, data: Value) -> Result<Option<Value>, AppError> {
        let q = sql::update(model, &self.registry, id, &object(model, data)?);
        self.fetch_optional(&q).await
    }

    async fn delete(&self, model: &ModelConfig, id: &Value) -> Result<Option<Value>, AppError> {
        let q = sql::delete(model, id);
        self.fetch_optional(&q).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
