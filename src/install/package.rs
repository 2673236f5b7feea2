//! Package resolution: can this package be installed at all?
//!
//! The install phase checks installability rather than materialising files:
//! a registry lookup that returns an exact-name match counts as installed.
//! When the registry cannot be reached, a package-manager dry run decides.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::catalog::Ecosystem;
use crate::error::{McpCheckError, Result};
use crate::shell::{CommandRequest, ProcessOutput};

/// Default public npm registry.
pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";
/// Default public PyPI.
pub const PYPI_REGISTRY: &str = "https://pypi.org";

/// Answer from a package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Exact-name match.
    Found {
        name: String,
        version: Option<String>,
    },
    NotFound,
    /// The index could not answer; fall back to a dry run.
    Unavailable(String),
}

/// Looks packages up by exact name.
pub trait PackageIndex: Send + Sync {
    fn lookup(&self, ecosystem: Ecosystem, name: &str) -> Lookup;
}

/// Registry lookups over HTTP.
pub struct HttpPackageIndex {
    client: Client,
    npm_base: String,
    pypi_base: String,
}

impl HttpPackageIndex {
    /// Index against the public registries.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_registries(timeout, NPM_REGISTRY, PYPI_REGISTRY)
    }

    /// Index against custom registry base URLs.
    pub fn with_registries(timeout: Duration, npm_base: &str, pypi_base: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("mcpcheck/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| McpCheckError::Other(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            npm_base: npm_base.trim_end_matches('/').to_string(),
            pypi_base: pypi_base.trim_end_matches('/').to_string(),
        })
    }

    fn fetch(&self, url: &str) -> std::result::Result<Option<Value>, String> {
        debug!("Registry lookup {}", url);
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                "registry timeout".to_string()
            } else {
                format!("registry unreachable: {}", e)
            }
        })?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<Value>()
                .map(Some)
                .map_err(|e| format!("registry returned invalid JSON: {}", e)),
            status => Err(format!("registry returned HTTP {}", status.as_u16())),
        }
    }

    fn lookup_npm(&self, name: &str) -> Lookup {
        // Scoped names keep the @ but need the slash escaped.
        let url = format!("{}/{}", self.npm_base, name.replace('/', "%2F"));
        match self.fetch(&url) {
            Ok(Some(doc)) => match doc.get("name").and_then(Value::as_str) {
                Some(found) if found == name => Lookup::Found {
                    name: found.to_string(),
                    version: doc
                        .pointer("/dist-tags/latest")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
                _ => Lookup::NotFound,
            },
            Ok(None) => Lookup::NotFound,
            Err(reason) => Lookup::Unavailable(reason),
        }
    }

    fn lookup_pypi(&self, name: &str) -> Lookup {
        let url = format!("{}/pypi/{}/json", self.pypi_base, name);
        match self.fetch(&url) {
            Ok(Some(doc)) => match doc.pointer("/info/name").and_then(Value::as_str) {
                Some(found) if normalize_pypi(found) == normalize_pypi(name) => Lookup::Found {
                    name: found.to_string(),
                    version: doc
                        .pointer("/info/version")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
                _ => Lookup::NotFound,
            },
            Ok(None) => Lookup::NotFound,
            Err(reason) => Lookup::Unavailable(reason),
        }
    }
}

impl PackageIndex for HttpPackageIndex {
    fn lookup(&self, ecosystem: Ecosystem, name: &str) -> Lookup {
        match ecosystem {
            Ecosystem::Npm => self.lookup_npm(name),
            Ecosystem::PyPi => self.lookup_pypi(name),
        }
    }
}

/// PEP 503 normalisation: lowercase, runs of `-_.` become one `-`.
pub fn normalize_pypi(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Dry-run command that checks installability without installing.
///
/// `pip_program` is the detected pip (`pip3` or `pip`).
pub fn dry_run_request(
    ecosystem: Ecosystem,
    name: &str,
    pip_program: &str,
    timeout: Duration,
) -> CommandRequest {
    match ecosystem {
        Ecosystem::Npm => CommandRequest::new("npm", timeout).with_args(["view", name, "name"]),
        Ecosystem::PyPi => CommandRequest::new(pip_program, timeout).with_args([
            "install",
            "--dry-run",
            "--no-deps",
            name,
        ]),
    }
}

/// Decide whether a successful dry run confirms the package.
///
/// `npm view <pkg> name` prints the canonical name; pip's dry run exits 0
/// only when it could resolve the distribution.
pub fn dry_run_confirms(ecosystem: Ecosystem, name: &str, output: &ProcessOutput) -> bool {
    if !output.success() {
        return false;
    }
    match ecosystem {
        Ecosystem::Npm => output
            .stdout()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .is_some_and(|l| l.trim_matches('\'') == name),
        Ecosystem::PyPi => true,
    }
}

/// Whether failed dry-run output says the package does not exist.
pub fn dry_run_says_missing(output: &ProcessOutput) -> bool {
    let text = output.combined().to_lowercase();
    text.contains("e404")
        || text.contains("404 not found")
        || text.contains("no matching distribution")
        || text.contains("could not find a version")
}
