//! Request/response types shared by every dispatched route, and the trait custom routes implement.

use crate::auth::Identity;
use crate::config::HttpMethod;
use crate::context::RequestContext;
use crate::error::AppError;
use crate::query::QueryParams;
use crate::service::CrudExecutor;
use async_trait::async_trait;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Everything a handler sees about one request. `identity` is filled in by the
/// permission check before the handler runs.
#[derive(Debug)]
pub struct RouteRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: QueryParams,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub context: RequestContext,
    pub identity: Option<Identity>,
}

impl RouteRequest {
    pub fn param(&self, name: &str) -> Result<&str, AppError> {
        self.params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("missing path parameter: {}", name)))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }

    /// Take the JSON body; absent bodies are rejected.
    pub fn take_body(&mut self) -> Result<Value, AppError> {
        self.body
            .take()
            .ok_or_else(|| AppError::BadRequest("request body required".into()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl RouteResponse {
    pub fn new(status: StatusCode, body: impl Serialize) -> Result<Self, AppError> {
        let body = serde_json::to_value(body).map_err(|e| AppError::Store(e.to_string()))?;
        Ok(RouteResponse { status, body })
    }

    pub fn ok(body: impl Serialize) -> Result<Self, AppError> {
        Self::new(StatusCode::OK, body)
    }

    pub fn created(body: impl Serialize) -> Result<Self, AppError> {
        Self::new(StatusCode::CREATED, body)
    }
}

impl IntoResponse for RouteResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Handler bound by name to a model's custom route.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn handle(&self, req: RouteRequest, exec: &CrudExecutor) -> Result<RouteResponse, AppError>;
}
