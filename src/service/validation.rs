//! Structural validation collaborator and a rule-driven implementation of it.

use crate::config::ValidationRule;
use crate::error::FieldIssue;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// `parse(data) -> data | issues`. Implementations may normalise the payload.
pub trait Schema: Send + Sync {
    fn parse(&self, data: Value) -> Result<Value, Vec<FieldIssue>>;
}

/// Schema built from declarative per-field rules. In partial mode (updates) no field is
/// required; rules still apply to the fields that are present.
pub struct RuleSchema {
    rules: Vec<(String, ValidationRule, Option<Regex>)>,
    partial: bool,
}

impl RuleSchema {
    /// Every field present in `rules` is validated; `required` is enforced.
    pub fn full(rules: &BTreeMap<String, ValidationRule>) -> Self {
        Self::compile(rules, false)
    }

    /// Only fields present in the payload are validated.
    pub fn partial(rules: &BTreeMap<String, ValidationRule>) -> Self {
        Self::compile(rules, true)
    }

    fn compile(rules: &BTreeMap<String, ValidationRule>, partial: bool) -> Self {
        let rules = rules
            .iter()
            .map(|(field, rule)| {
                let re = rule.pattern.as_deref().and_then(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(field = %field, error = %e, "ignoring invalid validation pattern");
                        None
                    }
                });
                (field.clone(), rule.clone(), re)
            })
            .collect();
        RuleSchema { rules, partial }
    }
}

impl Schema for RuleSchema {
    fn parse(&self, data: Value) -> Result<Value, Vec<FieldIssue>> {
        let Value::Object(body) = &data else {
            return Err(vec![FieldIssue::new("", "body must be a JSON object")]);
        };
        let mut issues = Vec::new();
        for (field, rule, re) in &self.rules {
            let val = body.get(field);
            if !self.partial
                && rule.required == Some(true)
                && (val.is_none() || val == Some(&Value::Null))
            {
                issues.push(FieldIssue::new(field, format!("{} is required", field)));
                continue;
            }
            if let Some(v) = val {
                if let Err(message) = validate_field(field, v, rule, re.as_ref()) {
                    issues.push(FieldIssue::new(field, message));
                }
            }
        }
        if issues.is_empty() {
            Ok(data)
        } else {
            Err(issues)
        }
    }
}

fn validate_field(col: &str, v: &Value, rule: &ValidationRule, re: Option<&Regex>) -> Result<(), String> {
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(col, v, format)?;
    }
    if let (Some(max), Some(s)) = (rule.max_length, v.as_str()) {
        if s.chars().count() > max as usize {
            return Err(format!("{} must be at most {} characters", col, max));
        }
    }
    if let (Some(min), Some(s)) = (rule.min_length, v.as_str()) {
        if s.chars().count() < min as usize {
            return Err(format!("{} must be at least {} characters", col, min));
        }
    }
    if let (Some(re), Some(s)) = (re, v.as_str()) {
        if !re.is_match(s) {
            return Err(format!("{} does not match required pattern", col));
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(format!(
                "{} must be one of: {:?}",
                col,
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, v.as_f64()) {
        if n < min {
            return Err(format!("{} must be at least {}", col, min));
        }
    }
    if let (Some(max), Some(n)) = (rule.maximum, v.as_f64()) {
        if n > max {
            return Err(format!("{} must be at most {}", col, max));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(col: &str, v: &Value, format: &str) -> Result<(), String> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => Err(format!("{} must be a valid email", col)),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Err(format!("{} must be a valid UUID", col)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> BTreeMap<String, ValidationRule> {
        serde_json::from_value(json!({
            "email": { "required": true, "format": "email" },
            "name": { "required": true, "min_length": 2, "max_length": 10 },
            "price": { "minimum": 0 },
            "status": { "allowed": ["draft", "active"] },
            "sku": { "pattern": "^[A-Z]{3}-\\d+$" }
        }))
        .unwrap()
    }

    #[test]
    fn full_schema_reports_every_issue() {
        let issues = RuleSchema::full(&rules())
            .parse(json!({ "name": "x", "price": -1, "status": "gone", "sku": "abc" }))
            .unwrap_err();
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["email", "name", "price", "sku", "status"]);
        assert_eq!(issues[0].message, "email is required");
    }

    #[test]
    fn partial_schema_skips_required() {
        let out = RuleSchema::partial(&rules()).parse(json!({ "price": 5 })).unwrap();
        assert_eq!(out, json!({ "price": 5 }));
        let issues = RuleSchema::partial(&rules()).parse(json!({ "email": "nope" })).unwrap_err();
        assert_eq!(issues[0].message, "email must be a valid email");
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(RuleSchema::full(&rules()).parse(json!([1, 2])).is_err());
    }
}
