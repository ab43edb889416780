//! Load model configs from JSON: one document, or every `*.json` file in a directory.

use crate::config::ModelConfig;
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Parse a document holding one model object or an array of them.
pub fn load_models_from_str(source: &str) -> Result<Vec<ModelConfig>, ConfigError> {
    let value: Value = serde_json::from_str(source).map_err(|e| ConfigError::Load(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(ConfigError::Load("model document must be an object or an array".into())),
    };
    items
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| ConfigError::Load(e.to_string())))
        .collect()
}

/// Read `*.json` files in file-name order so registration (and route) order is stable.
pub async fn load_models_from_dir(dir: impl AsRef<Path>) -> Result<Vec<ModelConfig>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    let mut models = Vec::new();
    for path in files {
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let parsed = load_models_from_str(&source)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(file = %path.display(), models = parsed.len(), "loaded model configs");
        models.extend(parsed);
    }
    Ok(models)
}
