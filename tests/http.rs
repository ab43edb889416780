use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use crudkit::query::{Condition, Operand, Predicate};
use crudkit::{
    api_router, ActivityEntry, AppError, AppState, Authorizer, CrudExecutor, CustomHandler, HeaderAuthorizer,
    HookContext, Identity, MemoryAuditSink, MemoryStore, ModelConfig, ModelExtensions, ModelHooks, ModelRegistry,
    RouteRequest, RouteResponse,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

struct UniqueSku;

#[async_trait]
impl ModelHooks for UniqueSku {
    async fn before_create(&self, data: Value, cx: &HookContext<'_>) -> Result<Value, AppError> {
        let filter = Predicate::field("sku", Condition::Equals(Operand::Value(data["sku"].clone())));
        if cx.store.find_first(cx.model, filter).await?.is_some() {
            return Err(AppError::Conflict(format!("duplicate sku {}", data["sku"])));
        }
        Ok(data)
    }

    async fn after_create(&self, created: &Value, cx: &HookContext<'_>) -> Result<(), AppError> {
        let written = cx
            .request
            .log_activity(ActivityEntry::new("create", &cx.model.name).entity(created["id"].clone()).user(cx.user_id));
        written.await.ok();
        Ok(())
    }
}

struct CoverImage;

#[async_trait]
impl CustomHandler for CoverImage {
    async fn handle(&self, mut req: RouteRequest, exec: &CrudExecutor) -> Result<RouteResponse, AppError> {
        let body = req.take_body()?;
        let url = body["url"]
            .as_str()
            .ok_or_else(|| AppError::invalid("url", "url is required"))?;
        let row = exec
            .update("product", req.param("id")?, json!({ "cover_image": url }), req.user_id(), &req.context)
            .await?;
        RouteResponse::ok(row)
    }
}

fn app() -> (Router, MemoryAuditSink) {
    let product: ModelConfig = serde_json::from_value(json!({
        "name": "product",
        "id_type": "integer",
        "validation": { "create": { "name": { "required": true }, "sku": { "required": true } } },
        "pagination": { "default_limit": 2, "max_limit": 5 },
        "sorting": { "default_field": "id", "default_order": "asc" },
        "permissions": { "delete": ["admin"] },
        "custom_routes": [{ "method": "POST", "path": "/:id/cover-image", "handler": "cover" }]
    }))
    .unwrap();
    let mut registry = ModelRegistry::new();
    registry
        .register_model(product, ModelExtensions::new().hooks(UniqueSku).handler("cover", CoverImage))
        .unwrap();
    let audit = MemoryAuditSink::new();
    let state = AppState::new(Arc::new(registry), Arc::new(MemoryStore::new()), "/api")
        .unwrap()
        .with_audit(Arc::new(audit.clone()))
        .with_public_identity(true);
    (api_router(state, 4096), audit)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

#[tokio::test]
async fn health_and_readiness() {
    let (app, _) = app();
    let (status, _, body) = send(&app, "GET", "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (status, _, body) = send(&app, "GET", "/ready", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"], 1);
}

#[tokio::test]
async fn create_list_and_read() {
    let (app, _) = app();
    for i in 0..6 {
        let (status, headers, body) = send(
            &app,
            "POST",
            "/api/products",
            &[("x-request-id", "req-42")],
            Some(json!({ "name": format!("p{i}"), "sku": format!("S{i}") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers["x-request-id"], "req-42");
        assert_eq!(body["id"], i + 1);
    }

    let (status, headers, body) = send(&app, "GET", "/api/products?limit=100&page=1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(body["pagination"], json!({ "page": 1, "limit": 5, "total": 6, "totalPages": 2 }));
    assert_eq!(body["data"].as_array().unwrap().len(), 5);

    let (status, _, body) = send(&app, "GET", "/api/products/3", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "p2");

    let (status, _, body) = send(&app, "GET", "/api/products/999", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _, _) = send(&app, "GET", "/api/products/abc", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_sku_is_a_conflict_without_side_effects() {
    let (app, audit) = app();
    let body = json!({ "name": "Lamp", "sku": "L-1" });
    let (status, _, _) = send(&app, "POST", "/api/products", &[("x-user-id", "u1")], Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, err) = send(&app, "POST", "/api/products", &[("x-user-id", "u1")], Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"]["code"], "conflict");

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id.as_deref(), Some("u1"));
    let (_, _, list) = send(&app, "GET", "/api/products", &[], None).await;
    assert_eq!(list["pagination"]["total"], 1);
}

#[tokio::test]
async fn validation_errors_carry_field_details() {
    let (app, _) = app();
    let (status, _, body) = send(&app, "POST", "/api/products", &[], Some(json!({ "sku": "X" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"][0]["path"], "name");

    let (status, _, _) = send(&app, "POST", "/api/products", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn declared_roles_are_enforced() {
    let (app, _) = app();
    send(&app, "POST", "/api/products", &[], Some(json!({ "name": "Desk", "sku": "D" }))).await;

    let (status, _, _) = send(&app, "DELETE", "/api/products/1", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let viewer = [("x-user-id", "u2"), ("x-user-roles", "viewer")];
    let (status, _, _) = send(&app, "DELETE", "/api/products/1", &viewer, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let admin = [("x-user-id", "u3"), ("x-user-roles", "admin")];
    let (status, _, body) = send(&app, "DELETE", "/api/products/1", &admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "id": 1 }));
}

#[tokio::test]
async fn custom_route_is_dispatched_before_generated_routes() {
    let (app, _) = app();
    send(&app, "POST", "/api/products", &[], Some(json!({ "name": "Desk", "sku": "D" }))).await;
    let (status, _, body) = send(
        &app,
        "POST",
        "/api/products/1/cover-image",
        &[],
        Some(json!({ "url": "https://cdn.example/desk.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cover_image"], "https://cdn.example/desk.png");
}

#[tokio::test]
async fn unmatched_routes_and_bad_bodies() {
    let (app, _) = app();
    let (status, _, body) = send(&app, "GET", "/api/gadgets", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let big = "x".repeat(8192);
    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_LENGTH, big.len())
        .body(Body::from(big))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn oversized_body_without_content_length_is_413() {
    let (app, _) = app();
    let payload = json!({ "name": "x".repeat(8192), "sku": "BIG" }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/api/products")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap();
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "payload_too_large");
}

#[derive(Clone, Default)]
struct CountingAuthorizer(Arc<AtomicUsize>);

#[async_trait]
impl Authorizer for CountingAuthorizer {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AppError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        HeaderAuthorizer.authenticate(headers).await
    }
}

#[tokio::test]
async fn role_less_operations_never_authenticate() {
    let calls = CountingAuthorizer::default();
    let mut registry = ModelRegistry::new();
    registry
        .register(serde_json::from_value(json!({ "name": "widget", "permissions": { "delete": ["admin"] } })).unwrap())
        .unwrap();
    let state = AppState::new(Arc::new(registry), Arc::new(MemoryStore::new()), "/api")
        .unwrap()
        .with_authorizer(calls.clone());
    let app = api_router(state, 4096);

    let user = [("x-user-id", "u1"), ("x-user-roles", "admin")];
    let (status, _, _) = send(&app, "GET", "/api/widgets", &user, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, created) = send(&app, "POST", "/api/widgets", &user, Some(json!({ "name": "w" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(calls.0.load(Ordering::SeqCst), 0);

    let uri = format!("/api/widgets/{}", created["id"].as_str().unwrap());
    let (status, _, _) = send(&app, "DELETE", &uri, &user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls.0.load(Ordering::SeqCst), 1);
}
