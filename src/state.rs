//! Shared application state. Everything here is built once at startup and read-only afterwards.

use crate::audit::{AuditSink, TracingAuditSink};
use crate::auth::{Authorizer, HeaderAuthorizer};
use crate::config::ModelRegistry;
use crate::error::ConfigError;
use crate::routes::{Dispatcher, RouteTable};
use crate::service::CrudExecutor;
use crate::store::Persistence;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub executor: CrudExecutor,
    pub dispatcher: Arc<Dispatcher>,
    pub authorizer: Arc<dyn Authorizer>,
    /// Sink behind every request's `RequestContext`.
    pub audit: Arc<dyn AuditSink>,
    /// Resolve a best-effort identity on public operations (owner fields, audit user ids).
    pub identify_public: bool,
}

impl AppState {
    /// Build the route table under `prefix`; identity comes from gateway headers and
    /// activity goes to the tracing log until overridden.
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn Persistence>,
        prefix: &str,
    ) -> Result<Self, ConfigError> {
        let dispatcher = Dispatcher::new(RouteTable::build(&registry, prefix)?)?;
        Ok(AppState {
            executor: CrudExecutor::new(registry, store),
            dispatcher: Arc::new(dispatcher),
            authorizer: Arc::new(HeaderAuthorizer),
            audit: Arc::new(TracingAuditSink),
            identify_public: false,
        })
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_public_identity(mut self, enabled: bool) -> Self {
        self.identify_public = enabled;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.executor.registry()
    }
}
