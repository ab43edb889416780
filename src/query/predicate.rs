//! Persistence query descriptor: `{filter, skip, take, order_by, include, select}`.

use crate::config::{IncludeConfig, SortOrder};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A comparison operand: a JSON scalar, or a timestamp parsed from a date filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Value),
    Timestamp(DateTime<Utc>),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Value(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equals(Operand),
    Contains { value: String, case_insensitive: bool },
    StartsWith { value: String, case_insensitive: bool },
    EndsWith { value: String, case_insensitive: bool },
    Gte(Operand),
    Lte(Operand),
    In(Vec<Operand>),
    Between(Operand, Operand),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Field { field: String, condition: Condition },
}

impl Predicate {
    pub fn field(field: impl Into<String>, condition: Condition) -> Self {
        Predicate::Field {
            field: field.into(),
            condition,
        }
    }

    /// AND of the parts; `None` when empty, the part itself when single.
    pub fn all(mut parts: Vec<Predicate>) -> Option<Predicate> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Predicate::And(parts)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Clone, Debug, Default)]
pub struct Query {
    pub filter: Option<Predicate>,
    /// 1-based page the skip was derived from.
    pub page: u64,
    pub skip: u64,
    pub take: u64,
    pub order_by: Option<OrderBy>,
    pub include: Vec<IncludeConfig>,
    pub select: Option<Vec<String>>,
}
