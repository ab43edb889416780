//! Model registry: write-once mapping from model name to config plus bound behaviour.

use crate::case::ConfigTransform;
use crate::config::{validate_model, ModelConfig, Operation};
use crate::error::{AppError, ConfigError};
use crate::handlers::CustomHandler;
use crate::hooks::{ModelHooks, Transform};
use crate::service::{RuleSchema, Schema};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What an absent role list means for an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DefaultAccess {
    /// Open to any caller, no check performed.
    #[default]
    Open,
    /// Rejected; open access must be declared with an explicit empty role list.
    Deny,
}

impl std::str::FromStr for DefaultAccess {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(DefaultAccess::Open),
            "deny" => Ok(DefaultAccess::Deny),
            _ => Err(ConfigError::Load(format!(
                "invalid default access: {} (expected open or deny)",
                s
            ))),
        }
    }
}

/// Resolved access decision for one model operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access<'a> {
    Public,
    Roles(&'a [String]),
    Denied,
}

/// Behaviour bound to a model at registration. All parts are optional.
#[derive(Clone, Default)]
pub struct ModelExtensions {
    pub hooks: Option<Arc<dyn ModelHooks>>,
    pub transform: Option<Arc<dyn Transform>>,
    pub create_schema: Option<Arc<dyn Schema>>,
    pub update_schema: Option<Arc<dyn Schema>>,
    pub query_schema: Option<Arc<dyn Schema>>,
    pub handlers: HashMap<String, Arc<dyn CustomHandler>>,
}

impl ModelExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn create_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.create_schema = Some(Arc::new(schema));
        self
    }

    pub fn update_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.update_schema = Some(Arc::new(schema));
        self
    }

    pub fn query_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.query_schema = Some(Arc::new(schema));
        self
    }

    pub fn handler(mut self, name: impl Into<String>, handler: impl CustomHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }
}

pub struct RegisteredModel {
    pub config: ModelConfig,
    pub hooks: Option<Arc<dyn ModelHooks>>,
    pub create_schema: Option<Arc<dyn Schema>>,
    pub update_schema: Option<Arc<dyn Schema>>,
    pub query_schema: Option<Arc<dyn Schema>>,
    pub handlers: HashMap<String, Arc<dyn CustomHandler>>,
    transform: Option<Arc<dyn Transform>>,
    builtin: ConfigTransform,
}

impl RegisteredModel {
    fn new(config: ModelConfig, ext: ModelExtensions) -> Self {
        let rules = &config.validation;
        let create_schema = ext.create_schema.or_else(|| {
            (!rules.create.is_empty()).then(|| Arc::new(RuleSchema::full(&rules.create)) as Arc<dyn Schema>)
        });
        let update_schema = ext.update_schema.or_else(|| {
            (!rules.update.is_empty()).then(|| Arc::new(RuleSchema::partial(&rules.update)) as Arc<dyn Schema>)
        });
        let query_schema = ext.query_schema.or_else(|| {
            (!rules.query.is_empty()).then(|| Arc::new(RuleSchema::partial(&rules.query)) as Arc<dyn Schema>)
        });
        let builtin = ConfigTransform::new(&config.transform);
        RegisteredModel {
            config,
            hooks: ext.hooks,
            create_schema,
            update_schema,
            query_schema,
            handlers: ext.handlers,
            transform: ext.transform,
            builtin,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Declarative transform first, then the bound one.
    pub fn transform_input(&self, data: Value) -> Result<Value, AppError> {
        let data = if self.builtin.is_identity() { data } else { self.builtin.input(data)? };
        match &self.transform {
            Some(t) => t.input(data),
            None => Ok(data),
        }
    }

    /// Bound transform first, then the declarative one (so hidden fields always go).
    pub fn transform_output(&self, row: Value) -> Value {
        let row = match &self.transform {
            Some(t) => t.output(row),
            None => row,
        };
        if self.builtin.is_identity() {
            row
        } else {
            self.builtin.output(row)
        }
    }
}

/// Immutable after startup: models are only ever added through `register_model`.
#[derive(Default)]
pub struct ModelRegistry {
    models: Vec<RegisteredModel>,
    by_name: HashMap<String, usize>,
    default_access: DefaultAccess,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_access(default_access: DefaultAccess) -> Self {
        ModelRegistry {
            default_access,
            ..Self::default()
        }
    }

    pub fn default_access(&self) -> DefaultAccess {
        self.default_access
    }

    pub fn register_model(&mut self, config: ModelConfig, extensions: ModelExtensions) -> Result<(), ConfigError> {
        validate_model(&config, &extensions, self)?;
        let key = config.key();
        if self.default_access == DefaultAccess::Open {
            let open: Vec<&str> = [Operation::Create, Operation::Read, Operation::Update, Operation::Delete]
                .into_iter()
                .filter(|op| config.permissions.roles_for(*op).is_none())
                .map(|op| op.as_str())
                .collect();
            if !open.is_empty() {
                tracing::warn!(model = %config.name, operations = ?open, "no roles declared, operations open to any caller");
            }
        }
        tracing::info!(model = %config.name, path = %config.path_segment(), custom_routes = config.custom_routes.len(), "registered model");
        self.by_name.insert(key, self.models.len());
        self.models.push(RegisteredModel::new(config, extensions));
        Ok(())
    }

    /// Register a config with no bound behaviour.
    pub fn register(&mut self, config: ModelConfig) -> Result<(), ConfigError> {
        self.register_model(config, ModelExtensions::new())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&RegisteredModel> {
        self.by_name.get(&name.to_lowercase()).map(|i| &self.models[*i])
    }

    pub fn model(&self, name: &str) -> Result<&RegisteredModel, AppError> {
        self.get(name)
            .ok_or_else(|| AppError::NotFound(format!("unknown model: {}", name)))
    }

    /// Models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn access<'a>(&self, roles: Option<&'a [String]>) -> Access<'a> {
        match roles {
            Some([]) => Access::Public,
            Some(roles) => Access::Roles(roles),
            None => match self.default_access {
                DefaultAccess::Open => Access::Public,
                DefaultAccess::Deny => Access::Denied,
            },
        }
    }

    pub fn access_for<'a>(&self, model: &'a ModelConfig, op: Operation) -> Access<'a> {
        self.access(model.permissions.roles_for(op))
    }
}
