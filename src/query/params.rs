//! Raw URL query parameters. Repeated keys and `key[]` keys become arrays.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut out = QueryParams::new();
        for (k, v) in pairs {
            let k: String = k.into();
            let v = Value::String(v.into());
            match k.strip_suffix("[]") {
                Some(base) => out.push(base, v, true),
                None => out.push(&k, v, false),
            }
        }
        out
    }

    fn push(&mut self, key: &str, value: Value, force_array: bool) {
        match self.0.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::take(existing);
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                let v = if force_array { Value::Array(vec![value]) } else { value };
                self.0.insert(key.to_string(), v);
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Scalar string value, or the first element of an array value.
    pub fn first_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Object form, used for structural validation of query payloads.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        QueryParams(iter.into_iter().collect())
    }
}
