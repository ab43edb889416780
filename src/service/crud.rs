//! Generic CRUD pipeline: validate, transform, hook, persist, hook, transform.

use crate::config::{IdType, ModelConfig, ModelRegistry, RegisteredModel};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::hooks::HookContext;
use crate::query::{QueryBuilder, QueryParams};
use crate::response::{DeleteResponse, ListResponse, Pagination};
use crate::service::Schema;
use crate::store::Persistence;
use serde_json::Value;
use std::sync::Arc;

/// Parse a path id by the model's key type. Uuids are normalised to lowercase hyphenated form.
pub fn parse_id(config: &ModelConfig, raw: &str) -> Result<Value, AppError> {
    Ok(match config.id_type {
        IdType::Uuid => {
            let u = uuid::Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid uuid: {}", raw)))?;
            Value::String(u.to_string())
        }
        IdType::Integer => {
            let n: i64 = raw
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid id: {}", raw)))?;
            Value::Number(n.into())
        }
        IdType::Text => Value::String(raw.to_string()),
    })
}

fn validate(schema: Option<&Arc<dyn Schema>>, data: Value) -> Result<Value, AppError> {
    match schema {
        Some(s) => s.parse(data).map_err(AppError::Validation),
        None => Ok(data),
    }
}

/// Runs every operation against one registry and one store. Cheap to clone.
#[derive(Clone)]
pub struct CrudExecutor {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn Persistence>,
}

impl CrudExecutor {
    pub fn new(registry: Arc<ModelRegistry>, store: Arc<dyn Persistence>) -> Self {
        CrudExecutor { registry, store }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    fn hook_context<'a>(
        &'a self,
        model: &'a RegisteredModel,
        user_id: Option<&'a str>,
        request: &'a RequestContext,
    ) -> HookContext<'a> {
        HookContext {
            store: self.store.as_ref(),
            registry: self.registry.as_ref(),
            model: &model.config,
            user_id,
            request,
        }
    }

    /// Count and page retrieval run concurrently; rows go through the output transform.
    pub async fn find_many(&self, model: &str, params: &QueryParams) -> Result<ListResponse, AppError> {
        let m = self.registry.model(model)?;
        if let Some(schema) = &m.query_schema {
            schema.parse(params.to_value()).map_err(AppError::Validation)?;
        }
        let query = QueryBuilder::build(&m.config, params)?;
        let (total, rows) = tokio::try_join!(
            self.store.count(&m.config, query.filter.as_ref()),
            self.store.find_many(&m.config, &query),
        )?;
        tracing::debug!(model = %m.name(), total, returned = rows.len(), skip = query.skip, take = query.take, "find_many");
        Ok(ListResponse {
            data: rows.into_iter().map(|r| m.transform_output(r)).collect(),
            pagination: Pagination::new(query.page, query.take, total),
        })
    }

    /// `None` when no row has the id; mapping that to 404 is the caller's job.
    pub async fn find_one(&self, model: &str, id: &str) -> Result<Option<Value>, AppError> {
        let m = self.registry.model(model)?;
        let id = parse_id(&m.config, id)?;
        let row = self.store.find_unique(&m.config, &id, &m.config.relations).await?;
        Ok(row.map(|r| m.transform_output(r)))
    }

    /// A failing `before_create` leaves storage untouched and skips `after_create`.
    /// A failing `after_create` still fails the call; the row stays persisted.
    pub async fn create(
        &self,
        model: &str,
        data: Value,
        user_id: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let m = self.registry.model(model)?;
        let data = validate(m.create_schema.as_ref(), data)?;
        let mut data = m.transform_input(data)?;
        if let (Some(field), Some(uid), Value::Object(map)) = (&m.config.owner_field, user_id, &mut data) {
            map.entry(field.clone())
                .or_insert_with(|| Value::String(uid.to_string()));
        }
        let cx = self.hook_context(m, user_id, ctx);
        if let Some(hooks) = &m.hooks {
            data = hooks.before_create(data, &cx).await?;
        }
        let created = self.store.create(&m.config, data).await?;
        if let Some(hooks) = &m.hooks {
            hooks.after_create(&created, &cx).await?;
        }
        tracing::debug!(request_id = %ctx.request_id(), model = %m.name(), id = %created[&m.config.primary_key], "created");
        Ok(m.transform_output(created))
    }

    pub async fn update(
        &self,
        model: &str,
        id: &str,
        data: Value,
        user_id: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Value, AppError> {
        let m = self.registry.model(model)?;
        let id = parse_id(&m.config, id)?;
        let data = validate(m.update_schema.as_ref(), data)?;
        let mut data = m.transform_input(data)?;
        let cx = self.hook_context(m, user_id, ctx);
        if let Some(hooks) = &m.hooks {
            data = hooks.before_update(&id, data, &cx).await?;
        }
        let updated = self
            .store
            .update(&m.config, &id, data)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", m.name(), id)))?;
        if let Some(hooks) = &m.hooks {
            hooks.after_update(&updated, &cx).await?;
        }
        tracing::debug!(request_id = %ctx.request_id(), model = %m.name(), id = %id, "updated");
        Ok(m.transform_output(updated))
    }

    pub async fn delete(
        &self,
        model: &str,
        id: &str,
        user_id: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<DeleteResponse, AppError> {
        let m = self.registry.model(model)?;
        let id = parse_id(&m.config, id)?;
        let cx = self.hook_context(m, user_id, ctx);
        if let Some(hooks) = &m.hooks {
            hooks.before_delete(&id, &cx).await?;
        }
        self.store
            .delete(&m.config, &id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", m.name(), id)))?;
        if let Some(hooks) = &m.hooks {
            hooks.after_delete(&id, &cx).await?;
        }
        tracing::debug!(request_id = %ctx.request_id(), model = %m.name(), id = %id, "deleted");
        Ok(DeleteResponse::deleted(id))
    }
}
