//! Persistence collaborator. The executor only talks to storage through `Persistence`;
//! `PgStore` renders SQL, `MemoryStore` evaluates query descriptors in process.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{ModelConfig, RelationsConfig};
use crate::error::AppError;
use crate::query::{Predicate, Query};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Persistence: Send + Sync {
    /// One page of rows: filter, order, skip/take, then projection and includes.
    async fn find_many(&self, model: &ModelConfig, query: &Query) -> Result<Vec<Value>, AppError>;

    async fn count(&self, model: &ModelConfig, filter: Option<&Predicate>) -> Result<u64, AppError>;

    async fn find_unique(
        &self,
        model: &ModelConfig,
        id: &Value,
        relations: &RelationsConfig,
    ) -> Result<Option<Value>, AppError>;

    /// Insert and return the stored row (generated keys included).
    async fn create(&self, model: &ModelConfig, data: Value) -> Result<Value, AppError>;

    /// Patch the row; `None` when no row has that id.
    async fn update(&self, model: &ModelConfig, id: &Value, data: Value) -> Result<Option<Value>, AppError>;

    /// Remove the row and return it; `None` when no row has that id.
    async fn delete(&self, model: &ModelConfig, id: &Value) -> Result<Option<Value>, AppError>;

    /// First row matching the filter, in storage order.
    async fn find_first(&self, model: &ModelConfig, filter: Predicate) -> Result<Option<Value>, AppError> {
        let query = Query {
            filter: Some(filter),
            page: 1,
            skip: 0,
            take: 1,
            ..Query::default()
        };
        Ok(self.find_many(model, &query).await?.into_iter().next())
    }

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
