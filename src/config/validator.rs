//! Registration-time checks: a config must be internally consistent and fit the registry.

use crate::config::{ModelConfig, ModelExtensions, ModelRegistry};
use crate::error::ConfigError;

pub fn validate_model(
    config: &ModelConfig,
    extensions: &ModelExtensions,
    registry: &ModelRegistry,
) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidModel {
        model: config.name.clone(),
        message,
    };

    if config.name.trim().is_empty() {
        return Err(invalid("name must not be empty".into()));
    }
    if registry.get(&config.name).is_some() {
        return Err(ConfigError::DuplicateModel(config.name.clone()));
    }

    let segment = config.path_segment();
    if segment.is_empty() || segment.contains('/') || segment.starts_with(':') {
        return Err(invalid(format!("invalid path segment '{}'", segment)));
    }
    if registry.models().any(|m| m.config.path_segment() == segment) {
        return Err(ConfigError::DuplicatePathSegment(segment));
    }

    let p = &config.pagination;
    if p.default_limit == 0 || p.max_limit == 0 {
        return Err(invalid("pagination limits must be positive".into()));
    }
    if p.default_limit > p.max_limit {
        return Err(invalid(format!(
            "default limit {} exceeds max limit {}",
            p.default_limit, p.max_limit
        )));
    }

    if let (Some(field), Some(allowed)) = (&config.sorting.default_field, &config.sorting.allowed) {
        if !allowed.contains(field) {
            return Err(invalid(format!("default sort field '{}' is not in the allow-list", field)));
        }
    }

    for (key, filter) in &config.filters {
        if key.is_empty() || filter.field.as_deref() == Some("") {
            return Err(invalid(format!("filter '{}' has an empty key or field", key)));
        }
    }

    if config.search.fuzzy && config.search.fields.is_empty() {
        tracing::debug!(model = %config.name, "fuzzy search enabled without search fields");
    }

    for include in &config.relations.include {
        if include.name.is_empty() || include.local_key.is_empty() || include.foreign_key.is_empty() {
            return Err(invalid(format!("include '{}' is incomplete", include.name)));
        }
    }

    for route in &config.custom_routes {
        if !route.path.starts_with('/') {
            return Err(ConfigError::InvalidRoute {
                template: route.path.clone(),
                message: "custom route path must start with '/'".into(),
            });
        }
        if !extensions.handlers.contains_key(&route.handler) {
            return Err(ConfigError::UnboundHandler {
                model: config.name.clone(),
                handler: route.handler.clone(),
            });
        }
    }

    Ok(())
}
