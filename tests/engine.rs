use async_trait::async_trait;
use crudkit::config::{FilterKind, HttpMethod, SortOrder};
use crudkit::query::{Condition, Predicate};
use crudkit::routes::{CrudOp, RouteHandler};
use crudkit::{
    AppError, CrudExecutor, CustomHandler, Dispatcher, HookContext, MemoryAuditSink, MemoryStore, ModelConfig,
    ModelExtensions, ModelHooks, ModelRegistry, Pagination, QueryBuilder, QueryParams, RequestContext, RouteRequest,
    RouteResponse, RouteTable,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Echo(&'static str);

#[async_trait]
impl CustomHandler for Echo {
    async fn handle(&self, req: RouteRequest, _exec: &CrudExecutor) -> Result<RouteResponse, AppError> {
        RouteResponse::ok(json!({ "handler": self.0, "params": req.params }))
    }
}

fn model(v: Value) -> ModelConfig {
    serde_json::from_value(v).unwrap()
}

fn custom_name(handler: &RouteHandler) -> Option<&str> {
    match handler {
        RouteHandler::Custom { name, .. } => Some(name.as_str()),
        RouteHandler::Crud(_) => None,
    }
}

fn product_registry() -> ModelRegistry {
    let mut reg = ModelRegistry::new();
    reg.register(ModelConfig::new("widget")).unwrap();
    let product = model(json!({
        "name": "product",
        "custom_routes": [
            { "method": "GET", "path": "/:id/reviews", "handler": "reviews" },
            { "method": "GET", "path": "/top/reviews", "handler": "top_reviews" },
            { "method": "POST", "path": "/:id/cover-image", "handler": "cover" },
            { "method": "PUT", "path": "/:id", "handler": "replace" }
        ]
    }));
    let ext = ModelExtensions::new()
        .handler("reviews", Echo("reviews"))
        .handler("top_reviews", Echo("top_reviews"))
        .handler("cover", Echo("cover"))
        .handler("replace", Echo("replace"));
    reg.register_model(product, ext).unwrap();
    reg
}

#[test]
fn widget_gets_exactly_the_five_crud_routes() {
    let mut reg = ModelRegistry::new();
    reg.register(ModelConfig::new("widget")).unwrap();
    let table = RouteTable::build(&reg, "/api").unwrap();
    assert_eq!(
        table.keys(),
        vec![
            "GET:/api/widgets",
            "POST:/api/widgets",
            "GET:/api/widgets/:id",
            "PUT:/api/widgets/:id",
            "DELETE:/api/widgets/:id",
        ]
    );
}

#[test]
fn paths_use_irregular_plurals() {
    let mut reg = ModelRegistry::new();
    reg.register(ModelConfig::new("category")).unwrap();
    reg.register(ModelConfig::new("Product")).unwrap();
    let keys = RouteTable::build(&reg, "/api").unwrap().keys();
    assert!(keys.contains(&"GET:/api/categories".to_string()));
    assert!(keys.contains(&"GET:/api/products/:id".to_string()));
}

#[test]
fn custom_routes_precede_generated_ones() {
    let table = RouteTable::build(&product_registry(), "/api").unwrap();
    let product_keys: Vec<_> = table
        .entries()
        .iter()
        .filter(|e| e.model == "product")
        .map(|e| e.key())
        .collect();
    assert_eq!(product_keys[0], "GET:/api/products/:id/reviews");
    assert_eq!(product_keys[4], "GET:/api/products");
    assert_eq!(table.entries()[0].model, "widget");
}

#[test]
fn exact_match_wins_over_earlier_pattern() {
    let dispatcher = Dispatcher::new(RouteTable::build(&product_registry(), "/api").unwrap()).unwrap();
    let m = dispatcher.resolve(HttpMethod::Get, "/api/products/top/reviews").unwrap();
    assert_eq!(custom_name(&m.entry.handler), Some("top_reviews"));
    assert!(m.params.is_empty());

    let m = dispatcher.resolve(HttpMethod::Get, "/api/products/42/reviews").unwrap();
    assert_eq!(custom_name(&m.entry.handler), Some("reviews"));
    assert_eq!(m.params["id"], "42");
}

#[test]
fn custom_route_takes_priority_over_generated_pattern() {
    let dispatcher = Dispatcher::new(RouteTable::build(&product_registry(), "/api").unwrap()).unwrap();
    let m = dispatcher.resolve(HttpMethod::Post, "/api/products/9/cover-image").unwrap();
    assert_eq!(custom_name(&m.entry.handler), Some("cover"));
    assert_eq!(m.params["id"], "9");

    let m = dispatcher.resolve(HttpMethod::Put, "/api/products/9").unwrap();
    assert_eq!(custom_name(&m.entry.handler), Some("replace"));

    let m = dispatcher.resolve(HttpMethod::Delete, "/api/products/9").unwrap();
    assert!(matches!(m.entry.handler, RouteHandler::Crud(CrudOp::Delete)));
}

#[test]
fn dispatch_is_deterministic_and_misses_are_none() {
    let dispatcher = Dispatcher::new(RouteTable::build(&product_registry(), "/api").unwrap()).unwrap();
    let a = dispatcher.resolve(HttpMethod::Get, "/api/widgets/7").unwrap();
    let b = dispatcher.resolve(HttpMethod::Get, "/api/widgets/7").unwrap();
    assert_eq!(a.entry.key(), b.entry.key());
    assert_eq!(a.params, b.params);
    assert!(dispatcher.resolve(HttpMethod::Get, "/api/gadgets").is_none());
    assert!(dispatcher.resolve(HttpMethod::Patch, "/api/widgets/7").is_none());
    assert!(dispatcher.resolve(HttpMethod::Get, "/api/widgets/7/extra").is_none());
}

fn listing_model() -> ModelConfig {
    model(json!({
        "name": "product",
        "pagination": { "default_limit": 20, "max_limit": 50 },
        "sorting": { "default_field": "created_at", "default_order": "desc", "allowed": ["name", "price", "created_at"] },
        "filters": { "priceRange": { "type": "between", "field": "price" } }
    }))
}

#[test]
fn limit_is_clamped_to_the_model_maximum() {
    let q = QueryBuilder::build(&listing_model(), &QueryParams::from_pairs([("limit", "500")])).unwrap();
    assert_eq!(q.take, 50);
    let q = QueryBuilder::build(&listing_model(), &QueryParams::from_pairs([("page", "3"), ("limit", "10")])).unwrap();
    assert_eq!((q.skip, q.take), (20, 10));
}

#[test]
fn disallowed_sort_falls_back_to_default() {
    let params = QueryParams::from_pairs([("sortBy", "password"), ("sortOrder", "asc")]);
    let q = QueryBuilder::build(&listing_model(), &params).unwrap();
    let order = q.order_by.unwrap();
    assert_eq!(order.field, "created_at");
    assert_eq!(order.order, SortOrder::Desc);
}

#[test]
fn one_element_between_is_ignored() {
    assert_eq!(listing_model().filters["priceRange"].kind, FilterKind::Between);
    let q = QueryBuilder::build(&listing_model(), &QueryParams::from_pairs([("priceRange[]", "10")])).unwrap();
    assert!(q.filter.is_none());
    let q = QueryBuilder::build(
        &listing_model(),
        &QueryParams::from_pairs([("priceRange", "10"), ("priceRange", "20")]),
    )
    .unwrap();
    assert!(matches!(
        q.filter,
        Some(Predicate::Field { condition: Condition::Between(_, _), .. })
    ));
}

#[test]
fn total_pages_is_the_rounded_up_quotient() {
    assert_eq!(Pagination::new(1, 20, 57).total_pages, 3);
}

struct RejectingHooks {
    after_create: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelHooks for RejectingHooks {
    async fn before_create(&self, _data: Value, _cx: &HookContext<'_>) -> Result<Value, AppError> {
        Err(AppError::Conflict("rejected".into()))
    }

    async fn after_create(&self, _created: &Value, _cx: &HookContext<'_>) -> Result<(), AppError> {
        self.after_create.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn failing_before_create_persists_nothing() {
    let after_create = Arc::new(AtomicUsize::new(0));
    let hooks = RejectingHooks {
        after_create: after_create.clone(),
    };
    let mut reg = ModelRegistry::new();
    reg.register_model(ModelConfig::new("ticket"), ModelExtensions::new().hooks(hooks))
        .unwrap();
    let store = MemoryStore::new();
    let exec = CrudExecutor::new(Arc::new(reg), Arc::new(store.clone()));
    let ctx = RequestContext::new(Arc::new(MemoryAuditSink::new()));

    let err = exec.create("ticket", json!({ "title": "x" }), None, &ctx).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.len(&ModelConfig::new("ticket")), 0);
    assert_eq!(after_create.load(Ordering::SeqCst), 0);
    let page = exec.find_many("ticket", &QueryParams::new()).await.unwrap();
    assert_eq!(page.pagination.total, 0);
}
