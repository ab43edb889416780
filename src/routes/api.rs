//! axum adapter: every request not served by the common routes goes through the dispatcher.

use crate::config::HttpMethod;
use crate::context::{RequestContext, REQUEST_ID_HEADER};
use crate::error::AppError;
use crate::handlers::{self, RouteRequest};
use crate::query::QueryParams;
use crate::routes::common_routes;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use tower_http::limit::RequestBodyLimitLayer;

/// Router serving the common routes plus every dispatched model route. Bodies larger
/// than `body_limit` bytes are rejected with 413.
pub fn api_router(state: AppState, body_limit: usize) -> Router {
    Router::<AppState>::new()
        .merge(common_routes())
        .fallback(dispatch)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(body_limit))
}

/// Buffer the body. Streamed bodies that overrun the limit layer surface as 413.
async fn read_body(body: Body) -> Result<Option<Value>, AppError> {
    let bytes = Bytes::from_request(Request::new(body), &()).await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(e.body_text())
        } else {
            AppError::BadRequest(format!("unreadable body: {}", e.body_text()))
        }
    })?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

async fn route(
    state: &AppState,
    ctx: RequestContext,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound(format!("no route for {} {}", method, uri.path()));
    let method = HttpMethod::parse(method.as_str()).ok_or_else(not_found)?;
    let matched = state.dispatcher.resolve(method, uri.path()).ok_or_else(not_found)?;
    tracing::debug!(request_id = %ctx.request_id(), route = %matched.entry.key(), params = ?matched.params, "dispatch");
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&uri)
        .map_err(|e| AppError::BadRequest(format!("invalid query string: {}", e)))?;
    let req = RouteRequest {
        method,
        path: uri.path().to_string(),
        params: matched.params,
        query: QueryParams::from_pairs(pairs),
        headers,
        body: read_body(body).await?,
        context: ctx,
        identity: None,
    };
    Ok(handlers::handle(state, matched.entry, req).await?.into_response())
}

async fn dispatch(
    State(state): State<AppState>,
    ctx: RequestContext,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = ctx.request_id().to_string();
    let started = ctx.clone();
    let label = format!("{} {}", method, uri.path());
    let mut response = route(&state, ctx, method, uri, headers, body)
        .await
        .unwrap_or_else(|e| e.into_response());
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), v);
    }
    tracing::info!(
        request_id = %request_id,
        route = %label,
        status = response.status().as_u16(),
        elapsed_ms = started.processing_time().as_millis() as u64,
        "request"
    );
    response
}
