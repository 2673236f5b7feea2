//! Runtime prerequisite detection.
//!
//! Each package-manager method needs its tool on PATH. Tools are probed
//! once per session with `<program> --version`; the first candidate that
//! answers wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::catalog::MethodKind;
use crate::shell::{CommandRequest, ProcessRunner};

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").unwrap());

/// Programs tried for a tool, in order.
pub fn candidates(kind: MethodKind) -> &'static [&'static str] {
    match kind {
        MethodKind::Npx => &["npx"],
        MethodKind::Python => &["python3", "python"],
        MethodKind::Pip => &["pip3", "pip"],
        MethodKind::Uvx => &["uvx"],
        MethodKind::ZeroInstall | MethodKind::Custom => &[],
    }
}

/// Detection result for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub kind: MethodKind,
    pub available: bool,
    /// Candidate that answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Why the last candidate failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tools detected at session start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prerequisites {
    pub tools: BTreeMap<MethodKind, ToolStatus>,
}

impl Prerequisites {
    /// Every package-manager tool present under its first candidate name.
    pub fn all_available() -> Self {
        let mut tools = BTreeMap::new();
        for kind in [
            MethodKind::Npx,
            MethodKind::Python,
            MethodKind::Pip,
            MethodKind::Uvx,
        ] {
            tools.insert(
                kind,
                ToolStatus {
                    kind,
                    available: true,
                    program: candidates(kind).first().map(|p| p.to_string()),
                    version: None,
                    error: None,
                },
            );
        }
        Self { tools }
    }

    /// Whether a tool is usable. Kinds without a tool always are.
    pub fn is_available(&self, kind: MethodKind) -> bool {
        if !kind.is_package_manager() {
            return true;
        }
        self.tools.get(&kind).is_some_and(|t| t.available)
    }

    /// Program to invoke for a tool, falling back to its first candidate.
    pub fn program_for(&self, kind: MethodKind) -> Option<&str> {
        self.tools
            .get(&kind)
            .and_then(|t| t.program.as_deref())
            .or_else(|| candidates(kind).first().copied())
    }

    /// Detected tools that are missing.
    pub fn missing(&self) -> Vec<MethodKind> {
        self.tools
            .values()
            .filter(|t| !t.available)
            .map(|t| t.kind)
            .collect()
    }
}

/// Probe each tool kind once.
pub fn detect(runner: &dyn ProcessRunner, kinds: &[MethodKind], timeout: Duration) -> Prerequisites {
    let mut result = Prerequisites::default();
    for &kind in kinds {
        if !kind.is_package_manager() || result.tools.contains_key(&kind) {
            continue;
        }
        let status = detect_tool(runner, kind, timeout);
        debug!(
            "Prerequisite {}: {}",
            kind,
            if status.available { "found" } else { "missing" }
        );
        result.tools.insert(kind, status);
    }
    result
}

fn detect_tool(runner: &dyn ProcessRunner, kind: MethodKind, timeout: Duration) -> ToolStatus {
    let mut last_error = None;
    for program in candidates(kind) {
        let request = CommandRequest::new(*program, timeout).with_args(["--version"]);
        let output = runner.run(&request);
        if output.success() {
            return ToolStatus {
                kind,
                available: true,
                program: Some(program.to_string()),
                version: extract_version(&output.combined()),
                error: None,
            };
        }
        last_error = Some(match &output.spawn_error {
            Some(e) => e.clone(),
            None if output.timed_out => format!("{} --version timed out", program),
            None => format!("{} --version failed", program),
        });
    }
    ToolStatus {
        kind,
        available: false,
        program: None,
        version: None,
        error: last_error,
    }
}

/// Pull a dotted version number out of tool output.
pub fn extract_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
