//! Catalog file loading.
//!
//! A catalog is either a list of subjects or a mapping with a `subjects`
//! key. Files ending in `.json` are parsed as JSON, anything else as YAML.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::subject::Subject;
use crate::error::{McpCheckError, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { subjects: Vec<Subject> },
    Bare(Vec<Subject>),
}

impl CatalogFile {
    fn into_subjects(self) -> Vec<Subject> {
        match self {
            Self::Wrapped { subjects } | Self::Bare(subjects) => subjects,
        }
    }
}

/// Load and check a catalog file.
pub fn load_catalog(path: &Path) -> Result<Vec<Subject>> {
    let content = fs::read_to_string(path).map_err(|e| McpCheckError::CatalogError {
        message: format!("cannot read {}: {}", path.display(), e),
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let subjects = parse_catalog(&content, is_json).map_err(|e| match e {
        McpCheckError::CatalogError { message } => McpCheckError::CatalogError {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    })?;
    debug!("Loaded {} subjects from {}", subjects.len(), path.display());
    Ok(subjects)
}

/// Parse catalog text.
pub fn parse_catalog(content: &str, json: bool) -> Result<Vec<Subject>> {
    let file: CatalogFile = if json {
        serde_json::from_str(content).map_err(|e| McpCheckError::CatalogError {
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(content).map_err(|e| McpCheckError::CatalogError {
            message: e.to_string(),
        })?
    };

    let mut subjects = file.into_subjects();
    let mut seen = HashSet::new();
    for subject in &mut subjects {
        subject.id = subject.id.trim().to_string();
        if subject.id.is_empty() {
            return Err(McpCheckError::CatalogError {
                message: "subject with empty id".to_string(),
            });
        }
        if !seen.insert(subject.id.clone()) {
            return Err(McpCheckError::CatalogError {
                message: format!("duplicate subject id '{}'", subject.id),
            });
        }
        if subject.name.trim().is_empty() {
            subject.name = subject.id.clone();
        }
    }
    Ok(subjects)
}
