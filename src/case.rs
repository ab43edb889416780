//! Built-in transform from `TransformConfig`: camelCase <-> snake_case keys and hidden fields.

use crate::config::{KeyCase, TransformConfig};
use crate::error::AppError;
use crate::hooks::Transform;
use serde_json::{Map, Value};

/// "user_id" -> "userId", "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// "userId" -> "user_id", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn rename_keys(obj: Map<String, Value>, f: fn(&str) -> String) -> Map<String, Value> {
    obj.into_iter().map(|(k, v)| (f(&k), v)).collect()
}

/// Renames top-level keys and the keys of embedded objects (includes) one level down.
fn rename_output(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (to_camel_case(&k), rename_nested(v)))
                .collect(),
        ),
        other => other,
    }
}

fn rename_nested(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(rename_keys(map, to_camel_case)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| match v {
                    Value::Object(m) => Value::Object(rename_keys(m, to_camel_case)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Transform derived from a model's declarative `transform` section.
pub struct ConfigTransform {
    key_case: Option<KeyCase>,
    hidden_fields: Vec<String>,
}

impl ConfigTransform {
    pub fn new(config: &TransformConfig) -> Self {
        ConfigTransform {
            key_case: config.key_case,
            hidden_fields: config.hidden_fields.clone(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.key_case.is_none() && self.hidden_fields.is_empty()
    }
}

impl Transform for ConfigTransform {
    fn input(&self, data: Value) -> Result<Value, AppError> {
        match (self.key_case, data) {
            (Some(KeyCase::Camel), Value::Object(map)) => Ok(Value::Object(rename_keys(map, to_snake_case))),
            (_, data) => Ok(data),
        }
    }

    fn output(&self, row: Value) -> Value {
        let row = match row {
            Value::Object(mut map) => {
                for f in &self.hidden_fields {
                    map.remove(f);
                }
                Value::Object(map)
            }
            other => other,
        };
        match self.key_case {
            Some(KeyCase::Camel) => rename_output(row),
            None => row,
        }
    }
}
