//! Declarative model configuration. Plain data: everything here deserializes from JSON;
//! behaviour (hooks, transforms, schemas, custom handlers) is bound via `ModelExtensions`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// CRUD operation a permission list applies to. List and single lookup are both `Read`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Primary key type for parsing path ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Uuid,
    Integer,
    Text,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Declarative structural rules per payload kind. Field order is kept stable for error output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub create: BTreeMap<String, ValidationRule>,
    #[serde(default)]
    pub update: BTreeMap<String, ValidationRule>,
    #[serde(default)]
    pub query: BTreeMap<String, ValidationRule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCase {
    /// Clients send and receive camelCase; storage uses snake_case.
    Camel,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub key_case: Option<KeyCase>,
    /// Fields that must never be exposed in responses (e.g. password hashes).
    #[serde(default)]
    pub hidden_fields: Vec<String>,
}

/// Allowed roles per operation. `None` defers to the registry default access;
/// `Some(vec![])` is an explicit public opt-in.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub create: Option<Vec<String>>,
    #[serde(default)]
    pub read: Option<Vec<String>>,
    #[serde(default)]
    pub update: Option<Vec<String>>,
    #[serde(default)]
    pub delete: Option<Vec<String>>,
}

impl PermissionsConfig {
    pub fn roles_for(&self, op: Operation) -> Option<&[String]> {
        match op {
            Operation::Create => self.create.as_deref(),
            Operation::Read => self.read.as_deref(),
            Operation::Update => self.update.as_deref(),
            Operation::Delete => self.delete.as_deref(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeKind {
    #[default]
    One,
    Many,
}

/// Related model embedded under `name`: rows of `model` whose `foreign_key`
/// equals this row's `local_key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncludeConfig {
    pub name: String,
    pub model: String,
    pub local_key: String,
    pub foreign_key: String,
    #[serde(default)]
    pub kind: IncludeKind,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelationsConfig {
    #[serde(default)]
    pub include: Vec<IncludeConfig>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub fuzzy: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

fn default_limit() -> u64 {
    20
}

fn default_max_limit() -> u64 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SortingConfig {
    #[serde(default)]
    pub default_field: Option<String>,
    #[serde(default)]
    pub default_order: SortOrder,
    /// When set, only these fields may be requested; anything else falls back to the default.
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Gte,
    Lte,
    In,
    Between,
    Boolean,
    Date,
}

/// Translates one query-string key into a predicate on `field` (defaults to the key).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HttpMethod::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported http method: {}", s)))
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra route mounted under the model's base path. `handler` names a handler bound in
/// the model's extensions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomRouteConfig {
    pub method: HttpMethod,
    pub path: String,
    pub handler: String,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Path segment override; defaults to the pluralized name.
    #[serde(default)]
    pub path: Option<String>,
    /// Storage table; defaults to the name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub id_type: IdType,
    /// Column SQL types used for casts when binding string values (e.g. "uuid", "timestamptz").
    #[serde(default)]
    pub column_types: HashMap<String, String>,
    /// Field that receives the acting user's id on create when absent from the payload.
    #[serde(default)]
    pub owner_field: Option<String>,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub relations: RelationsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub sorting: SortingConfig,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterConfig>,
    #[serde(default)]
    pub custom_routes: Vec<CustomRouteConfig>,
}

fn default_primary_key() -> String {
    "id".into()
}

impl ModelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ModelConfig {
            name: name.into(),
            path: None,
            table: None,
            schema: None,
            primary_key: default_primary_key(),
            id_type: IdType::default(),
            column_types: HashMap::new(),
            owner_field: None,
            validation: ValidationConfig::default(),
            transform: TransformConfig::default(),
            permissions: PermissionsConfig::default(),
            relations: RelationsConfig::default(),
            search: SearchConfig::default(),
            pagination: PaginationConfig::default(),
            sorting: SortingConfig::default(),
            filters: BTreeMap::new(),
            custom_routes: Vec::new(),
        }
    }

    /// Registry key: names are unique case-insensitively.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn path_segment(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| crate::routes::pluralize(&self.name.to_lowercase()))
    }
}
