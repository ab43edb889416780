//! Route table synthesized from the registry: custom routes first, then the five CRUD routes,
//! per model in registration order.

use crate::config::{HttpMethod, ModelRegistry, Operation};
use crate::error::ConfigError;
use crate::handlers::CustomHandler;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrudOp {
    List,
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOp {
    pub fn operation(self) -> Operation {
        match self {
            CrudOp::List | CrudOp::Read => Operation::Read,
            CrudOp::Create => Operation::Create,
            CrudOp::Update => Operation::Update,
            CrudOp::Delete => Operation::Delete,
        }
    }
}

#[derive(Clone)]
pub enum RouteHandler {
    Crud(CrudOp),
    Custom {
        name: String,
        handler: Arc<dyn CustomHandler>,
        permissions: Option<Vec<String>>,
    },
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteHandler::Crud(op) => write!(f, "Crud({:?})", op),
            RouteHandler::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RouteEntry {
    pub method: HttpMethod,
    pub template: String,
    /// Registry key of the owning model.
    pub model: String,
    pub handler: RouteHandler,
}

impl RouteEntry {
    /// `METHOD:/path/template`
    pub fn key(&self) -> String {
        format!("{}:{}", self.method, self.template)
    }

    pub fn is_static(&self) -> bool {
        !self.template.split('/').any(|s| s.starts_with(':'))
    }
}

#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

fn join(base: &str, path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}{}", base, path)
    }
}

impl RouteTable {
    /// Build from the registry. `prefix` is the mount prefix such as `/api` (may be empty).
    pub fn build(registry: &ModelRegistry, prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.trim_end_matches('/');
        let mut entries = Vec::new();
        for model in registry.models() {
            let key = model.config.key();
            let base = format!("{}/{}", prefix, model.config.path_segment());
            for route in &model.config.custom_routes {
                let handler = model.handlers.get(&route.handler).cloned().ok_or_else(|| {
                    ConfigError::UnboundHandler {
                        model: model.config.name.clone(),
                        handler: route.handler.clone(),
                    }
                })?;
                entries.push(RouteEntry {
                    method: route.method,
                    template: join(&base, &route.path),
                    model: key.clone(),
                    handler: RouteHandler::Custom {
                        name: route.handler.clone(),
                        handler,
                        permissions: route.permissions.clone(),
                    },
                });
            }
            let item = format!("{}/:id", base);
            for (method, template, op) in [
                (HttpMethod::Get, &base, CrudOp::List),
                (HttpMethod::Post, &base, CrudOp::Create),
                (HttpMethod::Get, &item, CrudOp::Read),
                (HttpMethod::Put, &item, CrudOp::Update),
                (HttpMethod::Delete, &item, CrudOp::Delete),
            ] {
                entries.push(RouteEntry {
                    method,
                    template: template.clone(),
                    model: key.clone(),
                    handler: RouteHandler::Crud(op),
                });
            }
        }
        tracing::debug!(routes = entries.len(), models = registry.len(), "route table built");
        Ok(RouteTable { entries })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(RouteEntry::key).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
