//! Product behaviour: SKU uniqueness, defaults, audit entries and the cover-image route.

use async_trait::async_trait;
use chrono::Utc;
use crudkit::query::{Condition, Operand, Predicate};
use crudkit::{
    ActivityEntry, AppError, CrudExecutor, CustomHandler, HookContext, ModelHooks, RouteRequest, RouteResponse,
};
use serde_json::{json, Value};

pub struct ProductHooks;

#[async_trait]
impl ModelHooks for ProductHooks {
    async fn before_create(&self, mut data: Value, cx: &HookContext<'_>) -> Result<Value, AppError> {
        let sku = data["sku"].clone();
        let same_sku = Predicate::field("sku", Condition::Equals(Operand::Value(sku.clone())));
        if cx.store.find_first(cx.model, same_sku).await?.is_some() {
            return Err(AppError::Conflict(format!("a product with sku {} already exists", sku)));
        }
        if let Value::Object(map) = &mut data {
            map.entry("status").or_insert_with(|| json!("draft"));
            map.entry("created_at")
                .or_insert_with(|| json!(Utc::now().to_rfc3339()));
        }
        Ok(data)
    }

    async fn after_create(&self, created: &Value, cx: &HookContext<'_>) -> Result<(), AppError> {
        cx.request.log_activity(
            ActivityEntry::new("create", &cx.model.name)
                .entity(created["id"].clone())
                .user(cx.user_id)
                .details(json!({ "sku": created["sku"] })),
        );
        Ok(())
    }

    /// Discontinued products cannot be reactivated.
    async fn before_update(&self, id: &Value, data: Value, cx: &HookContext<'_>) -> Result<Value, AppError> {
        if data.get("status") == Some(&json!("active")) {
            let current = cx.store.find_unique(cx.model, id, &Default::default()).await?;
            if current.as_ref().and_then(|p| p.get("status")) == Some(&json!("discontinued")) {
                return Err(AppError::Conflict("discontinued products cannot be reactivated".into()));
            }
        }
        Ok(data)
    }

    async fn after_delete(&self, id: &Value, cx: &HookContext<'_>) -> Result<(), AppError> {
        cx.request
            .log_activity(ActivityEntry::new("delete", &cx.model.name).entity(id.clone()).user(cx.user_id));
        Ok(())
    }
}

/// `POST /api/products/:id/cover-image` with `{ "url": "..." }`.
pub struct CoverImage;

#[async_trait]
impl CustomHandler for CoverImage {
    async fn handle(&self, mut req: RouteRequest, exec: &CrudExecutor) -> Result<RouteResponse, AppError> {
        let body = req.take_body()?;
        let url = body
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| u.starts_with("https://"))
            .ok_or_else(|| AppError::invalid("url", "url must be an https URL"))?;
        let product = exec
            .update("product", req.param("id")?, json!({ "coverImage": url }), req.user_id(), &req.context)
            .await?;
        RouteResponse::ok(product)
    }
}
