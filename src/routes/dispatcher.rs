//! Resolves (method, path) to a route entry: exact lookup first, then the precompiled
//! patterns in table order.

use crate::config::HttpMethod;
use crate::error::ConfigError;
use crate::routes::table::{RouteEntry, RouteTable};
use regex::Regex;
use std::collections::HashMap;

pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    pub params: HashMap<String, String>,
}

struct Pattern {
    index: usize,
    method: HttpMethod,
    regex: Regex,
}

/// Immutable after construction; safe to share across requests.
pub struct Dispatcher {
    table: RouteTable,
    exact: HashMap<String, usize>,
    patterns: Vec<Pattern>,
}

/// `/api/products/:id/cover` -> `^/api/products/(?P<id>[^/]+)/cover$`
fn compile(template: &str) -> Result<Regex, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidRoute {
        template: template.to_string(),
        message,
    };
    let mut pattern = String::from("^");
    for (i, segment) in template.split('/').enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        match segment.strip_prefix(':') {
            Some(name) => {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid(format!("bad parameter name ':{}'", name)));
                }
                pattern.push_str(&format!("(?P<{}>[^/]+)", name));
            }
            None => pattern.push_str(&regex::escape(segment)),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| invalid(e.to_string()))
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    }
}

impl Dispatcher {
    pub fn new(table: RouteTable) -> Result<Self, ConfigError> {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        for (index, entry) in table.entries().iter().enumerate() {
            if entry.is_static() {
                exact.entry(entry.key()).or_insert(index);
            } else {
                patterns.push(Pattern {
                    index,
                    method: entry.method,
                    regex: compile(&entry.template)?,
                });
            }
        }
        Ok(Dispatcher {
            table,
            exact,
            patterns,
        })
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// `None` means no route matched; the caller answers 404.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> Option<RouteMatch<'_>> {
        let path = normalize(path);
        let entries = self.table.entries();
        if let Some(&i) = self.exact.get(&format!("{}:{}", method, path)) {
            return Some(RouteMatch {
                entry: &entries[i],
                params: HashMap::new(),
            });
        }
        self.patterns
            .iter()
            .filter(|p| p.method == method)
            .find_map(|p| {
                let caps = p.regex.captures(path)?;
                let params = p
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                    .collect();
                Some(RouteMatch {
                    entry: &entries[p.index],
                    params,
                })
            })
    }
}
