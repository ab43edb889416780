//! In-process store. Tables are keyed by model key and created on first write.

use super::Persistence;
use crate::config::{IdType, IncludeConfig, IncludeKind, ModelConfig, RelationsConfig, SortOrder};
use crate::error::AppError;
use crate::query::{parse_date, Condition, Operand, Predicate, Query};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Row = Map<String, Value>;

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored for the model.
    pub fn len(&self, model: &ModelConfig) -> usize {
        self.read()
            .ok()
            .and_then(|t| t.get(&model.key()).map(|t| t.rows.len()))
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>, AppError> {
        self.tables
            .read()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>, AppError> {
        self.tables
            .write()
            .map_err(|_| AppError::Store("memory store lock poisoned".into()))
    }
}

fn get<'a>(row: &'a Row, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&Value::Null)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality across the string/number/bool boundary, as query strings arrive untyped.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => s == &x.to_string(),
        _ => false,
    }
}

fn compare(field: &Value, op: &Operand) -> Option<Ordering> {
    match op {
        Operand::Timestamp(ts) => parse_date(field).map(|d| d.cmp(ts)),
        Operand::Value(v) => match (as_number(field), as_number(v)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (field, v) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            },
        },
    }
}

fn equals(field: &Value, op: &Operand) -> bool {
    match op {
        Operand::Timestamp(_) => compare(field, op) == Some(Ordering::Equal),
        Operand::Value(v) => loose_eq(field, v),
    }
}

fn text_match(field: &Value, needle: &str, ci: bool, test: fn(&str, &str) -> bool) -> bool {
    let Some(hay) = as_text(field) else {
        return false;
    };
    if ci {
        test(&hay.to_lowercase(), &needle.to_lowercase())
    } else {
        test(&hay, needle)
    }
}

fn matches_condition(field: &Value, cond: &Condition) -> bool {
    match cond {
        Condition::Equals(op) => equals(field, op),
        Condition::Contains { value, case_insensitive } => {
            text_match(field, value, *case_insensitive, |h, n| h.contains(n))
        }
        Condition::StartsWith { value, case_insensitive } => {
            text_match(field, value, *case_insensitive, |h, n| h.starts_with(n))
        }
        Condition::EndsWith { value, case_insensitive } => {
            text_match(field, value, *case_insensitive, |h, n| h.ends_with(n))
        }
        Condition::Gte(op) => matches!(compare(field, op), Some(Ordering::Greater | Ordering::Equal)),
        Condition::Lte(op) => matches!(compare(field, op), Some(Ordering::Less | Ordering::Equal)),
        Condition::In(items) => items.iter().any(|op| equals(field, op)),
        Condition::Between(lo, hi) => {
            matches!(compare(field, lo), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare(field, hi), Some(Ordering::Less | Ordering::Equal))
        }
    }
}

fn matches(row: &Row, p: &Predicate) -> bool {
    match p {
        Predicate::And(parts) => parts.iter().all(|p| matches(row, p)),
        Predicate::Or(parts) => parts.iter().any(|p| matches(row, p)),
        Predicate::Field { field, condition } => matches_condition(get(row, field), condition),
    }
}

/// Nulls sort lowest; mixed kinds fall back to their JSON text.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn embed(
    tables: &HashMap<String, Table>,
    row: &Row,
    select: Option<&[String]>,
    include: &[IncludeConfig],
) -> Value {
    let mut out = match select {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(|f| (f.clone(), get(row, f).clone()))
            .collect::<Row>(),
        _ => row.clone(),
    };
    for inc in include {
        let key = get(row, &inc.local_key);
        let related = tables
            .get(&inc.model.to_lowercase())
            .map(|t| t.rows.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|r| !key.is_null() && loose_eq(get(r, &inc.foreign_key), key));
        let value = match inc.kind {
            IncludeKind::One => related.map(|r| Value::Object(r.clone())).next().unwrap_or(Value::Null),
            IncludeKind::Many => Value::Array(related.map(|r| Value::Object(r.clone())).collect()),
        };
        out.insert(inc.name.clone(), value);
    }
    Value::Object(out)
}

fn into_row(model: &ModelConfig, data: Value) -> Result<Row, AppError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest(format!("{} payload must be a JSON object", model.name))),
    }
}

fn position(table: &Table, model: &ModelConfig, id: &Value) -> Option<usize> {
    table
        .rows
        .iter()
        .position(|r| loose_eq(get(r, &model.primary_key), id))
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn find_many(&self, model: &ModelConfig, query: &Query) -> Result<Vec<Value>, AppError> {
        let tables = self.read()?;
        let Some(table) = tables.get(&model.key()) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<&Row> = table
            .rows
            .iter()
            .filter(|r| query.filter.as_ref().map_or(true, |p| matches(r, p)))
            .collect();
        if let Some(order) = &query.order_by {
            rows.sort_by(|a, b| {
                let o = order_values(get(a, &order.field), get(b, &order.field));
                match order.order {
                    SortOrder::Asc => o,
                    SortOrder::Desc => o.reverse(),
                }
            });
        }
        Ok(rows
            .into_iter()
            .skip(query.skip as usize)
            .take(query.take as usize)
            .map(|r| embed(&tables, r, query.select.as_deref(), &query.include))
            .collect())
    }

    async fn count(&self, model: &ModelConfig, filter: Option<&Predicate>) -> Result<u64, AppError> {
        let tables = self.read()?;
        Ok(tables.get(&model.key()).map_or(0, |t| {
            t.rows
                .iter()
                .filter(|r| filter.map_or(true, |p| matches(r, p)))
                .count() as u64
        }))
    }

    async fn find_unique(
        &self,
        model: &ModelConfig,
        id: &Value,
        relations: &RelationsConfig,
    ) -> Result<Option<Value>, AppError> {
        let tables = self.read()?;
        let Some(table) = tables.get(&model.key()) else {
            return Ok(None);
        };
        Ok(position(table, model, id)
            .map(|i| embed(&tables, &table.rows[i], relations.select.as_deref(), &relations.include)))
    }

    async fn create(&self, model: &ModelConfig, data: Value) -> Result<Value, AppError> {
        let mut row = into_row(model, data)?;
        let mut tables = self.write()?;
        let table = tables.entry(model.key()).or_default();
        let pk = &model.primary_key;
        match row.get(pk).filter(|v| !v.is_null()).cloned() {
            None => {
                let id = match model.id_type {
                    IdType::Integer => {
                        table.next_id += 1;
                        Value::from(table.next_id)
                    }
                    IdType::Uuid | IdType::Text => Value::String(uuid::Uuid::new_v4().to_string()),
                };
                row.insert(pk.clone(), id);
            }
            Some(id) => {
                if position(table, model, &id).is_some() {
                    return Err(AppError::Conflict(format!("{} {} already exists", model.name, id)));
                }
                if let Some(n) = id.as_i64() {
                    table.next_id = table.next_id.max(n);
                }
            }
        }
        table.rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update(&self, model: &ModelConfig, id: &Value, data: Value) -> Result<Option<Value>, AppError> {
        let patch = into_row(model, data)?;
        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.key()) else {
            return Ok(None);
        };
        let Some(i) = position(table, model, id) else {
            return Ok(None);
        };
        let row = &mut table.rows[i];
        for (k, v) in patch {
            if k != model.primary_key {
                row.insert(k, v);
            }
        }
        Ok(Some(Value::Object(row.clone())))
    }

    async fn delete(&self, model: &ModelConfig, id: &Value) -> Result<Option<Value>, AppError> {
        let mut tables = self.write()?;
        let Some(table) = tables.get_mut(&model.key()) else {
            return Ok(None);
        };
        Ok(position(table, model, id).map(|i| Value::Object(table.rows.remove(i))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::OrderBy;
    use serde_json::json;

    fn model(name: &str, id_type: IdType) -> ModelConfig {
        let mut m = ModelConfig::new(name);
        m.id_type = id_type;
        m
    }

    #[tokio::test]
    async fn generates_ids_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let m = model("tag", IdType::Integer);
        let a = store.create(&m, json!({ "label": "a" })).await.unwrap();
        let b = store.create(&m, json!({ "label": "b" })).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        let err = store.create(&m, json!({ "id": 2, "label": "c" })).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.len(&m), 2);

        let u = model("user", IdType::Uuid);
        let row = store.create(&u, json!({})).await.unwrap();
        assert!(uuid::Uuid::parse_str(row["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn filters_sort_and_page() {
        let store = MemoryStore::new();
        let m = model("product", IdType::Integer);
        for (name, price) in [("Lamp", 30), ("desk lamp", 80), ("Chair", 55)] {
            store.create(&m, json!({ "name": name, "price": price })).await.unwrap();
        }
        store.create(&m, json!({ "name": "Lamp shade" })).await.unwrap();
        let query = Query {
            filter: Some(Predicate::And(vec![
                Predicate::field("name", Condition::Contains { value: "LAMP".into(), case_insensitive: true }),
                Predicate::field("price", Condition::Gte(Operand::Value(json!("10")))),
            ])),
            page: 1,
            skip: 0,
            take: 10,
            order_by: Some(OrderBy { field: "price".into(), order: SortOrder::Desc }),
            include: vec![],
            select: Some(vec!["name".into()]),
        };
        let rows = store.find_many(&m, &query).await.unwrap();
        assert_eq!(rows, vec![json!({ "name": "desk lamp" }), json!({ "name": "Lamp" })]);
        assert_eq!(store.count(&m, query.filter.as_ref()).await.unwrap(), 2);
        assert_eq!(store.count(&m, None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn includes_related_rows() {
        let store = MemoryStore::new();
        let product = model("product", IdType::Integer);
        let review = model("review", IdType::Integer);
        store.create(&product, json!({ "name": "Lamp" })).await.unwrap();
        store.create(&review, json!({ "product_id": 1, "stars": 5 })).await.unwrap();
        store.create(&review, json!({ "product_id": "1", "stars": 3 })).await.unwrap();
        store.create(&review, json!({ "product_id": 2, "stars": 1 })).await.unwrap();
        let relations = RelationsConfig {
            include: vec![IncludeConfig {
                name: "reviews".into(),
                model: "Review".into(),
                local_key: "id".into(),
                foreign_key: "product_id".into(),
                kind: IncludeKind::Many,
            }],
            select: None,
        };
        let row = store.find_unique(&product, &json!(1), &relations).await.unwrap().unwrap();
        assert_eq!(row["reviews"].as_array().unwrap().len(), 2);
        assert!(store.find_unique(&product, &json!(9), &relations).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_keeps_primary_key_and_delete_removes() {
        let store = MemoryStore::new();
        let m = model("note", IdType::Text);
        let row = store.create(&m, json!({ "id": "n1", "body": "x" })).await.unwrap();
        let updated = store
            .update(&m, &row["id"], json!({ "id": "other", "body": "y" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated, json!({ "id": "n1", "body": "y" }));
        assert!(store.update(&m, &json!("missing"), json!({})).await.unwrap().is_none());
        assert!(store.delete(&m, &json!("n1")).await.unwrap().is_some());
        assert!(store.delete(&m, &json!("n1")).await.unwrap().is_none());
        assert_eq!(store.len(&m), 0);
    }
}
