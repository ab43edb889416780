//! Lifecycle extension points: hooks around persistence and input/output transforms.

use crate::config::{ModelConfig, ModelRegistry};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::store::Persistence;
use async_trait::async_trait;
use serde_json::Value;

/// What a hook can see: storage (for uniqueness or integrity checks), the registry,
/// the model being operated on, the acting user, and the request for audit correlation.
pub struct HookContext<'a> {
    pub store: &'a dyn Persistence,
    pub registry: &'a ModelRegistry,
    pub model: &'a ModelConfig,
    pub user_id: Option<&'a str>,
    pub request: &'a RequestContext,
}

/// Per-model lifecycle hooks. Every method defaults to a pass-through; returning an
/// error aborts the remaining pipeline stages.
#[async_trait]
pub trait ModelHooks: Send + Sync {
    /// May replace the payload. An error here means nothing is persisted.
    async fn before_create(&self, data: Value, _cx: &HookContext<'_>) -> Result<Value, AppError> {
        Ok(data)
    }

    async fn after_create(&self, _created: &Value, _cx: &HookContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_update(&self, _id: &Value, data: Value, _cx: &HookContext<'_>) -> Result<Value, AppError> {
        Ok(data)
    }

    async fn after_update(&self, _updated: &Value, _cx: &HookContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_delete(&self, _id: &Value, _cx: &HookContext<'_>) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_delete(&self, _id: &Value, _cx: &HookContext<'_>) -> Result<(), AppError> {
        Ok(())
    }
}

/// Input/output mapping around storage.
pub trait Transform: Send + Sync {
    fn input(&self, data: Value) -> Result<Value, AppError> {
        Ok(data)
    }

    fn output(&self, row: Value) -> Value {
        row
    }
}
