//! Route handlers: permission check, then the generated CRUD operation or the bound custom handler.

use crate::auth::{check_access, Identity};
use crate::config::Access;
use crate::error::AppError;
use crate::handlers::{RouteRequest, RouteResponse};
use crate::routes::{CrudOp, RouteEntry, RouteHandler};
use crate::service::CrudExecutor;
use crate::state::AppState;
use axum::http::HeaderMap;

/// Run the handler of a matched route. Each handler checks the model's role list for its
/// own operation; public operations make no authorization call.
pub async fn handle(state: &AppState, entry: &RouteEntry, mut req: RouteRequest) -> Result<RouteResponse, AppError> {
    let registry = state.executor.registry();
    let model = registry.model(&entry.model)?;
    match &entry.handler {
        RouteHandler::Crud(op) => {
            let access = registry.access_for(&model.config, op.operation());
            req.identity = identity(state, access, &req.headers).await?;
            crud(&state.executor, &model.config.name, *op, req).await
        }
        RouteHandler::Custom {
            name,
            handler,
            permissions,
        } => {
            let access = registry.access(permissions.as_deref());
            req.identity = identity(state, access, &req.headers).await?;
            tracing::debug!(request_id = %req.context.request_id(), model = %model.config.name, handler = %name, "custom route");
            handler.handle(req, &state.executor).await
        }
    }
}

/// Public operations carry an identity only when the application opted in.
async fn identity(state: &AppState, access: Access<'_>, headers: &HeaderMap) -> Result<Option<Identity>, AppError> {
    if access == Access::Public && state.identify_public {
        return Ok(state.authorizer.identify(headers).await);
    }
    check_access(state.authorizer.as_ref(), access, headers).await
}

async fn crud(exec: &CrudExecutor, model: &str, op: CrudOp, mut req: RouteRequest) -> Result<RouteResponse, AppError> {
    match op {
        CrudOp::List => RouteResponse::ok(exec.find_many(model, &req.query).await?),
        CrudOp::Create => {
            let body = req.take_body()?;
            RouteResponse::created(exec.create(model, body, req.user_id(), &req.context).await?)
        }
        CrudOp::Read => {
            let id = req.param("id")?;
            let row = exec
                .find_one(model, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("{} {}", model, id)))?;
            RouteResponse::ok(row)
        }
        CrudOp::Update => {
            let body = req.take_body()?;
            let id = req.param("id")?;
            RouteResponse::ok(exec.update(model, id, body, req.user_id(), &req.context).await?)
        }
        CrudOp::Delete => {
            let id = req.param("id")?;
            RouteResponse::ok(exec.delete(model, id, req.user_id(), &req.context).await?)
        }
    }
}
