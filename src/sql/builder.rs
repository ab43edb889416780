//! Renders query descriptors into parameterized PostgreSQL. Identifiers come from model
//! config only and are always quoted; values are always bound. Every row-returning
//! statement yields a single JSONB column.

use crate::config::{IdType, IncludeConfig, IncludeKind, ModelConfig, ModelRegistry, SortOrder};
use crate::query::{Condition, Operand, Predicate, Query};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};

const MAIN_ALIAS: &str = "main";
const SUB_ALIAS: &str = "sub";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
fn qualified_table(model: &ModelConfig) -> String {
    match &model.schema {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(model.table_name())),
        None => quoted(model.table_name()),
    }
}

fn column(alias: &str, name: &str) -> String {
    format!("{}.{}", alias, quoted(name))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder for a JSON value, cast to the column's declared type when known.
    /// `NULL` is inlined.
    fn placeholder(&mut self, model: &ModelConfig, field: &str, v: &Value) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        let n = self.push_param(PgBindValue::from_json(v));
        match model.column_types.get(field) {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

/// Left-hand side and right-hand side of a comparison. Untyped string operands compare
/// against the column's text form.
fn comparison(q: &mut QueryBuf, model: &ModelConfig, field: &str, op: &Operand) -> (String, String) {
    let col = column(MAIN_ALIAS, field);
    match op {
        Operand::Timestamp(ts) => {
            let n = q.push_param(PgBindValue::String(ts.to_rfc3339()));
            (col, format!("${}::timestamptz", n))
        }
        Operand::Value(v) => {
            let typed = model.column_types.contains_key(field);
            let lhs = if !typed && v.is_string() { format!("{}::text", col) } else { col };
            (lhs, q.placeholder(model, field, v))
        }
    }
}

fn render_text_match(q: &mut QueryBuf, field: &str, pattern: String, case_insensitive: bool) -> String {
    let n = q.push_param(PgBindValue::String(pattern));
    let op = if case_insensitive { "ILIKE" } else { "LIKE" };
    format!("{}::text {} ${}", column(MAIN_ALIAS, field), op, n)
}

fn render_condition(q: &mut QueryBuf, model: &ModelConfig, field: &str, cond: &Condition) -> String {
    match cond {
        Condition::Equals(Operand::Value(Value::Null)) => format!("{} IS NULL", column(MAIN_ALIAS, field)),
        Condition::Equals(op) => {
            let (lhs, rhs) = comparison(q, model, field, op);
            format!("{} = {}", lhs, rhs)
        }
        Condition::Contains { value, case_insensitive } => {
            render_text_match(q, field, format!("%{}%", escape_like(value)), *case_insensitive)
        }
        Condition::StartsWith { value, case_insensitive } => {
            render_text_match(q, field, format!("{}%", escape_like(value)), *case_insensitive)
        }
        Condition::EndsWith { value, case_insensitive } => {
            render_text_match(q, field, format!("%{}", escape_like(value)), *case_insensitive)
        }
        Condition::Gte(op) => {
            let (lhs, rhs) = comparison(q, model, field, op);
            format!("{} >= {}", lhs, rhs)
        }
        Condition::Lte(op) => {
            let (lhs, rhs) = comparison(q, model, field, op);
            format!("{} <= {}", lhs, rhs)
        }
        Condition::In(items) => {
            if items.is_empty() {
                return "FALSE".into();
            }
            let mut lhs = String::new();
            let mut rhs = Vec::with_capacity(items.len());
            for op in items {
                let (l, r) = comparison(q, model, field, op);
                if lhs.is_empty() {
                    lhs = l;
                }
                rhs.push(r);
            }
            format!("{} IN ({})", lhs, rhs.join(", "))
        }
        Condition::Between(lo, hi) => {
            let (lhs, lo) = comparison(q, model, field, lo);
            let (_, hi) = comparison(q, model, field, hi);
            format!("{} BETWEEN {} AND {}", lhs, lo, hi)
        }
    }
}

fn render_predicate(q: &mut QueryBuf, model: &ModelConfig, p: &Predicate) -> String {
    match p {
        Predicate::And(parts) if parts.is_empty() => "TRUE".into(),
        Predicate::Or(parts) if parts.is_empty() => "FALSE".into(),
        Predicate::And(parts) => {
            let rendered: Vec<_> = parts.iter().map(|p| render_predicate(q, model, p)).collect();
            format!("({})", rendered.join(" AND "))
        }
        Predicate::Or(parts) => {
            let rendered: Vec<_> = parts.iter().map(|p| render_predicate(q, model, p)).collect();
            format!("({})", rendered.join(" OR "))
        }
        Predicate::Field { field, condition } => render_condition(q, model, field, condition),
    }
}

fn where_clause(q: &mut QueryBuf, model: &ModelConfig, filter: Option<&Predicate>) -> String {
    match filter {
        Some(p) => format!(" WHERE {}", render_predicate(q, model, p)),
        None => String::new(),
    }
}

/// Placeholder for a primary key value: uuid keys are bound as text and cast.
fn id_placeholder(q: &mut QueryBuf, model: &ModelConfig, id: &Value) -> String {
    let n = q.push_param(PgBindValue::from_json(id));
    match (model.column_types.get(&model.primary_key), model.id_type) {
        (Some(t), _) => format!("${}::{}", n, t),
        (None, IdType::Uuid) => format!("${}::uuid", n),
        (None, _) => format!("${}", n),
    }
}

fn include_subquery(include: &IncludeConfig, related: &ModelConfig) -> String {
    let from = format!(
        "{} {} WHERE {} = {}",
        qualified_table(related),
        SUB_ALIAS,
        column(SUB_ALIAS, &include.foreign_key),
        column(MAIN_ALIAS, &include.local_key)
    );
    match include.kind {
        IncludeKind::One => format!("(SELECT to_jsonb({}) FROM {} LIMIT 1)", SUB_ALIAS, from),
        IncludeKind::Many => format!(
            "(SELECT COALESCE(jsonb_agg(to_jsonb({})), '[]'::jsonb) FROM {})",
            SUB_ALIAS, from
        ),
    }
}

/// JSONB expression for one main row: selected columns (or all) plus embedded includes.
fn row_expression(
    model: &ModelConfig,
    registry: &ModelRegistry,
    select: Option<&[String]>,
    include: &[IncludeConfig],
) -> String {
    let mut expr = match select {
        Some(fields) if !fields.is_empty() => {
            let pairs: Vec<String> = fields
                .iter()
                .map(|f| format!("{}, {}", literal(f), column(MAIN_ALIAS, f)))
                .collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        }
        _ => format!("to_jsonb({})", MAIN_ALIAS),
    };
    for inc in include {
        let Some(related) = registry.get(&inc.model) else {
            tracing::warn!(model = %model.name, include = %inc.name, related = %inc.model, "include target not registered, skipping");
            continue;
        };
        expr.push_str(&format!(
            " || jsonb_build_object({}, {})",
            literal(&inc.name),
            include_subquery(inc, &related.config)
        ));
    }
    expr
}

/// SELECT page of rows: filter, ORDER BY, LIMIT/OFFSET, projection and includes.
pub fn select_many(model: &ModelConfig, registry: &ModelRegistry, query: &Query) -> QueryBuf {
    let mut q = QueryBuf::new();
    let row = row_expression(model, registry, query.select.as_deref(), &query.include);
    let where_sql = where_clause(&mut q, model, query.filter.as_ref());
    let order_sql = query
        .order_by
        .as_ref()
        .map(|o| {
            let dir = match o.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            format!(" ORDER BY {} {}", column(MAIN_ALIAS, &o.field), dir)
        })
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} AS row FROM {} {}{}{} LIMIT {} OFFSET {}",
        row,
        qualified_table(model),
        MAIN_ALIAS,
        where_sql,
        order_sql,
        query.take,
        query.skip
    );
    q
}

pub fn count(model: &ModelConfig, filter: Option<&Predicate>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, model, filter);
    q.sql = format!(
        "SELECT COUNT(*) FROM {} {}{}",
        qualified_table(model),
        MAIN_ALIAS,
        where_sql
    );
    q
}

/// SELECT by primary key with configured projection and includes.
pub fn select_by_id(
    model: &ModelConfig,
    registry: &ModelRegistry,
    id: &Value,
    select: Option<&[String]>,
    include: &[IncludeConfig],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let row = row_expression(model, registry, select, include);
    let ph = id_placeholder(&mut q, model, id);
    q.sql = format!(
        "SELECT {} AS row FROM {} {} WHERE {} = {}",
        row,
        qualified_table(model),
        MAIN_ALIAS,
        column(MAIN_ALIAS, &model.primary_key),
        ph
    );
    q
}

/// INSERT every key of the payload; columns absent from it take their DB default.
pub fn insert(model: &ModelConfig, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(model);
    if data.is_empty() {
        q.sql = format!(
            "INSERT INTO {} AS {} DEFAULT VALUES RETURNING to_jsonb({}) AS row",
            table, MAIN_ALIAS, MAIN_ALIAS
        );
        return q;
    }
    let mut cols = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    for (k, v) in data {
        cols.push(quoted(k));
        placeholders.push(q.placeholder(model, k, v));
    }
    q.sql = format!(
        "INSERT INTO {} AS {} ({}) VALUES ({}) RETURNING to_jsonb({}) AS row",
        table,
        MAIN_ALIAS,
        cols.join(", "),
        placeholders.join(", "),
        MAIN_ALIAS
    );
    q
}

/// UPDATE by id: SET only the keys present (never the primary key).
pub fn update(model: &ModelConfig, registry: &ModelRegistry, id: &Value, data: &Map<String, Value>) -> QueryBuf {
    let mut sets = Vec::new();
    let mut q = QueryBuf::new();
    for (k, v) in data {
        if *k == model.primary_key {
            continue;
        }
        let rhs = q.placeholder(model, k, v);
        sets.push(format!("{} = {}", quoted(k), rhs));
    }
    if sets.is_empty() {
        return select_by_id(model, registry, id, None, &[]);
    }
    let ph = id_placeholder(&mut q, model, id);
    q.sql = format!(
        "UPDATE {} AS {} SET {} WHERE {} = {} RETURNING to_jsonb({}) AS row",
        qualified_table(model),
        MAIN_ALIAS,
        sets.join(", "),
        column(MAIN_ALIAS, &model.primary_key),
        ph,
        MAIN_ALIAS
    );
    q
}

/// DELETE by id.
pub fn delete(model: &ModelConfig, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = id_placeholder(&mut q, model, id);
    q.sql = format!(
        "DELETE FROM {} AS {} WHERE {} = {} RETURNING to_jsonb({}) AS row",
        qualified_table(model),
        MAIN_ALIAS,
        column(MAIN_ALIAS, &model.primary_key),
        ph,
        MAIN_ALIAS
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Query};
    use serde_json::json;

    fn product() -> ModelConfig {
        serde_json::from_value(json!({
            "name": "product",
            "schema": "shop",
            "column_types": { "created_at": "timestamptz" }
        }))
        .unwrap()
    }

    #[test]
    fn select_many_renders_filters_order_and_paging() {
        let reg = ModelRegistry::new();
        let query = Query {
            filter: Some(Predicate::And(vec![
                Predicate::field("status", Condition::Equals(Operand::Value(json!("active")))),
                Predicate::Or(vec![Predicate::field(
                    "name",
                    Condition::Contains { value: "50%_off".into(), case_insensitive: true },
                )]),
                Predicate::field("price", Condition::Between(Operand::Value(json!(1)), Operand::Value(json!(9)))),
            ])),
            page: 2,
            skip: 10,
            take: 10,
            order_by: Some(OrderBy { field: "price".into(), order: SortOrder::Asc }),
            include: vec![],
            select: None,
        };
        let q = select_many(&product(), &reg, &query);
        assert_eq!(
            q.sql,
            "SELECT to_jsonb(main) AS row FROM \"shop\".\"product\" main WHERE \
             (main.\"status\"::text = $1 AND (main.\"name\"::text ILIKE $2) AND main.\"price\" BETWEEN $3 AND $4) \
             ORDER BY main.\"price\" ASC LIMIT 10 OFFSET 10"
        );
        assert_eq!(q.params[1], PgBindValue::String("%50\\%\\_off%".into()));
        assert_eq!(q.params[2], PgBindValue::I64(1));
    }

    #[test]
    fn typed_columns_and_nulls() {
        let mut data = Map::new();
        data.insert("created_at".into(), json!("2024-01-01T00:00:00Z"));
        data.insert("note".into(), Value::Null);
        let q = insert(&product(), &data);
        assert_eq!(
            q.sql,
            "INSERT INTO \"shop\".\"product\" AS main (\"created_at\", \"note\") VALUES ($1::timestamptz, NULL) \
             RETURNING to_jsonb(main) AS row"
        );
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn delete_casts_uuid_ids() {
        let q = delete(&product(), &json!("2b1f7a8e-0000-4000-8000-000000000000"));
        assert!(q.sql.ends_with("WHERE main.\"id\" = $1::uuid RETURNING to_jsonb(main) AS row"));
    }

    #[test]
    fn includes_embed_related_rows() {
        let mut reg = ModelRegistry::new();
        reg.register(serde_json::from_value(json!({ "name": "review" })).unwrap()).unwrap();
        let include = vec![IncludeConfig {
            name: "reviews".into(),
            model: "review".into(),
            local_key: "id".into(),
            foreign_key: "product_id".into(),
            kind: IncludeKind::Many,
        }];
        let q = select_by_id(&product(), &reg, &json!(7), None, &include);
        assert!(q.sql.contains(
            "|| jsonb_build_object('reviews', (SELECT COALESCE(jsonb_agg(to_jsonb(sub)), '[]'::jsonb) \
             FROM \"review\" sub WHERE sub.\"product_id\" = main.\"id\"))"
        ));
    }
}
