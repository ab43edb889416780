//! Build the per-request context from the `x-request-id` header (or a fresh UUID).

use crate::context::{RequestContext, REQUEST_ID_HEADER};
use crate::state::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

#[async_trait]
impl FromRequestParts<AppState> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && s.len() <= 128);
        Ok(match request_id {
            Some(id) => RequestContext::with_request_id(id, state.audit.clone()),
            None => RequestContext::new(state.audit.clone()),
        })
    }
}
