//! Environment templates for install methods.
//!
//! Catalog entries describe the variables a server expects, usually with
//! placeholder values. Templates support `${VAR}` and `${VAR:-default}`
//! interpolation (`$${` produces a literal `${`), and angle-bracket
//! placeholders such as `<your-api-key>`.
//!
//! # Example
//!
//! ```
//! use mcpcheck::catalog::EnvTemplate;
//!
//! let mut template = EnvTemplate::default();
//! template.insert("REGION", "${REGION:-us-east-1}");
//! let env = template.resolve_with(|_| None);
//! assert_eq!(env["REGION"], "us-east-1");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Value substituted for placeholders nobody supplied.
///
/// Servers that demand an API key at startup still launch and answer the
/// handshake with a dummy key; the probe only checks that they start.
pub const PLACEHOLDER_VALUE: &str = "test-value";

/// Key/value template for a command's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvTemplate(BTreeMap<String, String>);

impl EnvTemplate {
    /// Build from an ordered map.
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self(vars)
    }

    /// Add or replace one variable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Whether the template declares no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Declared variable names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> HashMap<String, String> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve with a custom lookup.
    ///
    /// A variable already set in the environment wins over its template
    /// value, so real credentials are used when the operator provides them.
    pub fn resolve_with<F>(&self, lookup: F) -> HashMap<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.0
            .iter()
            .map(|(key, template)| {
                let value = match lookup(key) {
                    Some(v) if !v.is_empty() => v,
                    _ => interpolate(template, &lookup),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Expand placeholders in one template value.
pub fn interpolate<F>(template: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let trimmed = template.trim();
    if trimmed.starts_with('<') && trimmed.ends_with('>') && trimmed.len() > 2 {
        return PLACEHOLDER_VALUE.to_string();
    }

    let mut out = String::new();
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(escaped) = after.strip_prefix("${") {
            out.push_str("${");
            rest = escaped;
            continue;
        }

        let Some(body_start) = after.strip_prefix('{') else {
            out.push('$');
            rest = after;
            continue;
        };

        match body_start.find('}') {
            Some(end) => {
                out.push_str(&expand(&body_start[..end], lookup));
                rest = &body_start[end + 1..];
            }
            None => {
                // Unterminated reference stays literal.
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand<F>(body: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let (name, default) = match body.split_once(":-") {
        Some((name, default)) => (name.trim(), Some(default)),
        None => (body.trim(), None),
    };
    match lookup(name) {
        Some(v) if !v.is_empty() => v,
        _ => default
            .map(str::to_string)
            .unwrap_or_else(|| PLACEHOLDER_VALUE.to_string()),
    }
}
