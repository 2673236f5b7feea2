//! PostgREST-style HTTP attempt store.
//!
//! Tables live under `<url>/rest/v1/<table>`. Requests carry the API key
//! both as `apikey` and as a bearer token; writes ask for the affected rows
//! back with `Prefer: return=representation`.

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{AttemptRecord, AttemptStatus, AttemptStore, NewAttempt, StoreQuery};
use crate::config::StoreSettings;
use crate::error::{McpCheckError, Result};

/// HTTP client for a PostgREST-compatible backend.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    attempts_table: String,
}

impl RestStore {
    /// Connect using settings; the key is read from `settings.api_key_env`.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(settings, api_key)
    }

    pub fn new(settings: &StoreSettings, api_key: Option<String>) -> Result<Self> {
        let base_url = settings
            .url
            .clone()
            .ok_or_else(|| McpCheckError::ConfigValidationError {
                message: "store.url is required when store.kind is rest".to_string(),
            })?;
        let client = Client::builder()
            .user_agent(concat!("mcpcheck/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| McpCheckError::store("connect", e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            attempts_table: settings.attempts_table.clone(),
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, table))
            .map_err(|e| McpCheckError::store("request", format!("bad store url: {}", e)))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }
        builder
    }

    fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .map_err(|e| McpCheckError::store(operation, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(McpCheckError::store(
                operation,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        Ok(response)
    }

    fn rows(&self, operation: &str, response: Response) -> Result<Vec<Value>> {
        let text = response
            .text()
            .map_err(|e| McpCheckError::store(operation, e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Value>(&text)
            .map(|v| match v {
                Value::Array(rows) => rows,
                other => vec![other],
            })
            .map_err(|e| McpCheckError::store(operation, format!("invalid JSON: {}", e)))
    }

    fn eq(value: &str) -> String {
        format!("eq.{}", value)
    }
}

impl AttemptStore for RestStore {
    fn describe(&self) -> String {
        format!("rest ({})", self.base_url)
    }

    fn ping(&self) -> Result<()> {
        let url = self.table_url(
            &self.attempts_table,
            &[("select", "id".to_string()), ("limit", "1".to_string())],
        )?;
        self.send("ping", self.request(Method::GET, url))?;
        Ok(())
    }

    fn insert_attempt(&self, attempt: &NewAttempt) -> Result<String> {
        let url = self.table_url(&self.attempts_table, &[])?;
        let body = json!({
            "subject_id": attempt.subject_id,
            "method": attempt.method,
            "status": AttemptStatus::Pending.as_str(),
            "platform": attempt.platform.label(),
            "ci": attempt.platform.ci,
            "session_id": attempt.session_id,
            "created_at": Utc::now(),
        });
        let response = self.send(
            "insert",
            self.request(Method::POST, url)
                .header("Prefer", "return=representation")
                .json(&body),
        )?;
        let rows = self.rows("insert", response)?;
        let id = rows
            .first()
            .and_then(|row| row.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| McpCheckError::store("insert", "response carried no id"))?;
        debug!("Inserted attempt {} for {}", id, attempt.subject_id);
        Ok(id)
    }

    fn update_attempt_status(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let url = self.table_url(&self.attempts_table, &[("id", Self::eq(attempt_id))])?;
        let body = json!({
            "status": status.as_str(),
            "error": error,
            "updated_at": Utc::now(),
        });
        let response = self.send(
            "update",
            self.request(Method::PATCH, url)
                .header("Prefer", "return=representation")
                .json(&body),
        )?;
        if self.rows("update", response)?.is_empty() {
            return Err(McpCheckError::store(
                "update",
                format!("no attempt with id {}", attempt_id),
            ));
        }
        Ok(())
    }

    fn query_latest_attempt(&self, subject_id: &str) -> Result<Option<AttemptRecord>> {
        let url = self.table_url(
            &self.attempts_table,
            &[
                ("subject_id", Self::eq(subject_id)),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ],
        )?;
        let response = self.send("query", self.request(Method::GET, url))?;
        match self.rows("query", response)?.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| McpCheckError::store("query", format!("unexpected row: {}", e))),
            None => Ok(None),
        }
    }

    fn delete_attempts(&self, subject_id: &str) -> Result<usize> {
        let url = self.table_url(&self.attempts_table, &[("subject_id", Self::eq(subject_id))])?;
        let response = self.send(
            "delete",
            self.request(Method::DELETE, url)
                .header("Prefer", "return=representation"),
        )?;
        Ok(self.rows("delete", response)?.len())
    }

    fn read(&self, query: &StoreQuery) -> Result<Vec<Value>> {
        let mut params: Vec<(&str, String)> = query
            .filters
            .iter()
            .map(|(column, value)| (column.as_str(), Self::eq(value)))
            .collect();
        if let Some((column, desc)) = &query.order {
            let dir = if *desc { "desc" } else { "asc" };
            params.push(("order", format!("{}.{}", column, dir)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let url = self.table_url(&query.table, &params)?;
        let response = self.send("read", self.request(Method::GET, url))?;
        self.rows("read", response)
    }
}
