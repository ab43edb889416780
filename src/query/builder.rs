//! Turns a model config plus raw URL parameters into a `Query`. Pure: no I/O.

use crate::case::to_snake_case;
use crate::config::{FilterConfig, FilterKind, KeyCase, ModelConfig, SortOrder};
use crate::error::AppError;
use crate::query::{Condition, Operand, OrderBy, Predicate, Query, QueryParams};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

pub const PAGE_PARAM: &str = "page";
pub const LIMIT_PARAM: &str = "limit";
pub const SEARCH_PARAM: &str = "search";
const SORT_PARAMS: [&str; 2] = ["sortBy", "sort"];
const ORDER_PARAMS: [&str; 2] = ["sortOrder", "order"];

pub struct QueryBuilder;

impl QueryBuilder {
    /// Build the query descriptor. Malformed paging and sort values fall back to the
    /// model defaults; only an unparsable `date` filter is rejected.
    pub fn build(config: &ModelConfig, params: &QueryParams) -> Result<Query, AppError> {
        let (page, limit, take) = Self::paging(config, params);
        let mut parts = Vec::new();
        if let Some(search) = Self::search(config, params) {
            parts.push(search);
        }
        for (key, filter) in &config.filters {
            if let Some(p) = Self::filter(key, filter, params)? {
                parts.push(p);
            }
        }
        Ok(Query {
            filter: Predicate::all(parts),
            page,
            skip: (page - 1).saturating_mul(limit),
            take,
            order_by: Self::order_by(config, params),
            include: config.relations.include.clone(),
            select: config.relations.select.clone(),
        })
    }

    /// `(page, limit, take)`: page defaults to 1 (clamped to >= 1), limit to the model
    /// default. Only take is capped at the model maximum; the offset follows the
    /// requested limit.
    pub fn paging(config: &ModelConfig, params: &QueryParams) -> (u64, u64, u64) {
        let page = params
            .first_str(PAGE_PARAM)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1) as u64;
        let limit = params
            .first_str(LIMIT_PARAM)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(config.pagination.default_limit);
        (page, limit, limit.min(config.pagination.max_limit))
    }

    fn search(config: &ModelConfig, params: &QueryParams) -> Option<Predicate> {
        let term = params.first_str(SEARCH_PARAM).map(str::trim).filter(|s| !s.is_empty())?;
        if config.search.fields.is_empty() {
            return None;
        }
        let ors = config
            .search
            .fields
            .iter()
            .map(|f| {
                Predicate::field(
                    f.clone(),
                    Condition::Contains {
                        value: term.to_string(),
                        case_insensitive: config.search.fuzzy,
                    },
                )
            })
            .collect();
        Some(Predicate::Or(ors))
    }

    fn filter(key: &str, filter: &FilterConfig, params: &QueryParams) -> Result<Option<Predicate>, AppError> {
        let Some(raw) = params.get(key).filter(|v| !is_empty_value(v)) else {
            return Ok(None);
        };
        let field = filter.field.clone().unwrap_or_else(|| key.to_string());
        let first = first_scalar(raw);
        let condition = match filter.kind {
            FilterKind::Exact => Condition::Equals(Operand::Value(first)),
            FilterKind::Contains => Condition::Contains {
                value: scalar_text(&first),
                case_insensitive: true,
            },
            FilterKind::StartsWith => Condition::StartsWith {
                value: scalar_text(&first),
                case_insensitive: true,
            },
            FilterKind::EndsWith => Condition::EndsWith {
                value: scalar_text(&first),
                case_insensitive: true,
            },
            FilterKind::Gte => Condition::Gte(Operand::Value(coerce_number(first))),
            FilterKind::Lte => Condition::Lte(Operand::Value(coerce_number(first))),
            FilterKind::In => {
                let items = match raw {
                    Value::Array(items) => items.clone(),
                    scalar => vec![scalar.clone()],
                };
                Condition::In(items.into_iter().map(Operand::Value).collect())
            }
            FilterKind::Between => match raw {
                Value::Array(items) if items.len() == 2 => Condition::Between(
                    Operand::Value(coerce_number(items[0].clone())),
                    Operand::Value(coerce_number(items[1].clone())),
                ),
                _ => return Ok(None),
            },
            FilterKind::Boolean => {
                let truthy = matches!(&first, Value::Bool(true))
                    || matches!(&first, Value::String(s) if s == "true");
                Condition::Equals(Operand::Value(Value::Bool(truthy)))
            }
            FilterKind::Date => {
                let ts = parse_date(&first).ok_or_else(|| {
                    AppError::invalid(format!("filters.{}", key), "invalid date")
                })?;
                Condition::Equals(Operand::Timestamp(ts))
            }
        };
        Ok(Some(Predicate::field(field, condition)))
    }

    /// Sort by the requested field (or the default field when none is given) in the
    /// requested direction. A field outside the allow-list falls back to both defaults.
    /// Camel-case models accept the client's key spelling.
    fn order_by(config: &ModelConfig, params: &QueryParams) -> Option<OrderBy> {
        let sorting = &config.sorting;
        let requested = SORT_PARAMS
            .iter()
            .find_map(|k| params.first_str(k))
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| match config.transform.key_case {
                Some(KeyCase::Camel) => to_snake_case(f),
                None => f.to_string(),
            });
        let order = ORDER_PARAMS
            .iter()
            .find_map(|k| params.first_str(k))
            .and_then(SortOrder::parse)
            .unwrap_or(sorting.default_order);
        let field = requested.or_else(|| sorting.default_field.clone())?;
        let allowed = sorting.default_field.as_deref() == Some(field.as_str())
            || sorting
                .allowed
                .as_ref()
                .map(|list| list.iter().any(|a| *a == field))
                .unwrap_or(true);
        if allowed {
            return Some(OrderBy { field, order });
        }
        tracing::debug!(model = %config.name, field = %field, "sort field not allowed, using default");
        sorting.default_field.as_ref().map(|f| OrderBy {
            field: f.clone(),
            order: sorting.default_order,
        })
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn first_scalar(v: &Value) -> Value {
    match v {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric-looking strings become numbers so range bounds compare numerically.
fn coerce_number(v: Value) -> Value {
    if let Value::String(s) = &v {
        if let Ok(n) = s.trim().parse::<i64>() {
            return Value::Number(n.into());
        }
        if let Some(n) = s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Value::Number(n);
        }
    }
    v
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`
/// and epoch milliseconds. Naive values are taken as UTC.
pub fn parse_date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Some(d.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(d.and_utc());
                }
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
            }
            s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        _ => None,
    }
}
