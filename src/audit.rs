//! Audit collaborator: sinks that persist activity records produced inside hooks.

use crate::config::ModelConfig;
use crate::error::AppError;
use crate::store::Persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// What a hook reports. The request context stamps it into an `ActivityRecord`.
#[derive(Clone, Debug)]
pub struct ActivityEntry {
    pub action: String,
    pub model: String,
    pub entity_id: Option<Value>,
    pub user_id: Option<String>,
    pub details: Value,
}

impl ActivityEntry {
    pub fn new(action: impl Into<String>, model: impl Into<String>) -> Self {
        ActivityEntry {
            action: action.into(),
            model: model.into(),
            entity_id: None,
            user_id: None,
            details: Value::Null,
        }
    }

    pub fn entity(mut self, id: Value) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityRecord {
    pub request_id: String,
    pub action: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub details: Value,
    pub at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn stamp(entry: ActivityEntry, request_id: &str) -> Self {
        ActivityRecord {
            request_id: request_id.to_string(),
            action: entry.action,
            model: entry.model,
            entity_id: entry.entity_id,
            user_id: entry.user_id,
            details: entry.details,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> Result<(), AppError>;
}

/// Writes activity to the tracing pipeline only.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: ActivityRecord) -> Result<(), AppError> {
        tracing::info!(
            request_id = %record.request_id,
            action = %record.action,
            model = %record.model,
            entity_id = ?record.entity_id,
            user_id = ?record.user_id,
            "activity"
        );
        Ok(())
    }
}

/// Keeps records in memory; useful for tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<RwLock<Vec<ActivityRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: ActivityRecord) -> Result<(), AppError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| AppError::Store("audit lock poisoned".into()))?;
        guard.push(record);
        Ok(())
    }
}

/// Persists records as rows of a registered model through the persistence collaborator.
pub struct StoreAuditSink {
    store: Arc<dyn Persistence>,
    model: ModelConfig,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn Persistence>, model: ModelConfig) -> Self {
        StoreAuditSink { store, model }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, record: ActivityRecord) -> Result<(), AppError> {
        let row = serde_json::to_value(&record).map_err(|e| AppError::Store(e.to_string()))?;
        self.store.create(&self.model, row).await?;
        Ok(())
    }
}
