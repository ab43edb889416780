//! crudkit: model-driven CRUD engine. Declarative model configs become HTTP routes
//! served through a validate, transform, hook, persist pipeline.

pub mod audit;
pub mod auth;
pub mod case;
pub mod config;
pub mod context;
pub mod error;
mod extractors;
pub mod handlers;
pub mod hooks;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use audit::{ActivityEntry, ActivityRecord, AuditSink, MemoryAuditSink, StoreAuditSink, TracingAuditSink};
pub use auth::{Authorizer, HeaderAuthorizer, Identity};
pub use config::{
    load_models_from_dir, load_models_from_str, DefaultAccess, ModelConfig, ModelExtensions, ModelRegistry, Settings,
};
pub use context::RequestContext;
pub use error::{AppError, ConfigError, FieldIssue};
pub use handlers::{CustomHandler, RouteRequest, RouteResponse};
pub use hooks::{HookContext, ModelHooks, Transform};
pub use query::{Query, QueryBuilder, QueryParams};
pub use response::{DeleteResponse, ListResponse, Pagination};
pub use routes::{api_router, pluralize, Dispatcher, RouteTable};
pub use service::{CrudExecutor, RuleSchema, Schema};
pub use state::AppState;
pub use store::{MemoryStore, Persistence, PgStore};

/// Install the `tracing` subscriber, filtered by `RUST_LOG` (default `crudkit=info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crudkit=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
