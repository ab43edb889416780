//! Process settings from the environment (and `.env` when present).

use crate::config::DefaultAccess;
use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct Settings {
    /// PostgreSQL connection string; when absent the in-memory store is used.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub models_path: String,
    pub api_prefix: String,
    pub default_access: DefaultAccess,
    pub body_limit: usize,
    /// Pass identity headers through on public operations.
    pub identify_public: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            db_max_connections: 5,
            bind_addr: "0.0.0.0:3000".into(),
            models_path: "models".into(),
            api_prefix: "/api".into(),
            default_access: DefaultAccess::Open,
            body_limit: 1024 * 1024,
            identify_public: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parse_num = |key: &str, raw: String| {
            raw.parse::<usize>()
                .map_err(|_| ConfigError::Load(format!("{} must be a number, got '{}'", key, raw)))
        };

        let parse_flag = |key: &str, raw: &str| match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Load(format!("{} must be true or false, got '{}'", key, raw))),
        };

        let api_prefix = get("API_PREFIX")
            .map(|p| format!("/{}", p.trim_matches('/')))
            .map(|p| if p == "/" { String::new() } else { p })
            .unwrap_or(defaults.api_prefix);

        Ok(Settings {
            database_url: get("DATABASE_URL"),
            db_max_connections: match get("DB_MAX_CONNECTIONS") {
                Some(raw) => parse_num("DB_MAX_CONNECTIONS", raw)? as u32,
                None => defaults.db_max_connections,
            },
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            models_path: get("MODELS_PATH").unwrap_or(defaults.models_path),
            api_prefix,
            default_access: match get("DEFAULT_ACCESS") {
                Some(raw) => raw.parse()?,
                None => defaults.default_access,
            },
            body_limit: match get("BODY_LIMIT") {
                Some(raw) => parse_num("BODY_LIMIT", raw)?,
                None => defaults.body_limit,
            },
            identify_public: match get("IDENTIFY_PUBLIC") {
                Some(raw) => parse_flag("IDENTIFY_PUBLIC", &raw)?,
                None => defaults.identify_public,
            },
        })
    }
}
