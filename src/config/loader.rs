//! Configuration file discovery and loading.
//!
//! Every file is optional. Layers are deep-merged as raw YAML before the
//! typed parse, so a project file only needs the keys it changes.
//!
//! Merge order (later overrides earlier):
//! 1. User global config (`~/.mcpcheck/config.yml`)
//! 2. Project config (`.mcpcheck/config.yml`)
//! 3. Explicit `--config <path>`

use crate::config::schema::HarnessConfig;
use crate::error::{McpCheckError, Result};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name holding project-level mcpcheck files.
pub const CONFIG_DIR: &str = ".mcpcheck";

/// Paths to configuration layers in merge order.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// `~/.mcpcheck/config.yml`, when it exists.
    pub user_global: Option<PathBuf>,
    /// `<project>/.mcpcheck/config.yml`, when it exists.
    pub project: Option<PathBuf>,
    /// Path given on the command line; must exist.
    pub explicit: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover config layers for a project root.
    pub fn discover(project_root: &Path, explicit: Option<&Path>) -> Self {
        Self {
            user_global: Self::find_user_global(),
            project: existing(project_root.join(CONFIG_DIR).join("config.yml")),
            explicit: explicit.map(Path::to_path_buf),
        }
    }

    fn find_user_global() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        existing(PathBuf::from(home).join(CONFIG_DIR).join("config.yml"))
    }

    /// Layers in merge order.
    pub fn layers(&self) -> Vec<&PathBuf> {
        [&self.user_global, &self.project, &self.explicit]
            .into_iter()
            .flatten()
            .collect()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

/// Load and merge every config layer for a project.
///
/// # Errors
///
/// Returns `ConfigNotFound` if an explicit path does not exist, and
/// `ConfigParseError` if any layer is invalid YAML or the merged document
/// does not match the schema.
pub fn load_config(project_root: &Path, explicit: Option<&Path>) -> Result<HarnessConfig> {
    let paths = ConfigPaths::discover(project_root, explicit);

    let mut merged = Value::Mapping(Default::default());
    let mut last_path = project_root.join(CONFIG_DIR).join("config.yml");
    for path in paths.layers() {
        let layer = load_config_value(path)?;
        merged = deep_merge(&merged, &layer);
        last_path = path.clone();
    }

    serde_yaml::from_value(merged).map_err(|e| McpCheckError::ConfigParseError {
        path: last_path,
        message: e.to_string(),
    })
}

/// Parse YAML content into a config.
pub fn parse_config(content: &str, source_path: &Path) -> Result<HarnessConfig> {
    serde_yaml::from_str(content).map_err(|e| McpCheckError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load one layer as a raw YAML value.
pub fn load_config_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            McpCheckError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            McpCheckError::Io(e)
        }
    })?;

    if content.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }

    serde_yaml::from_str(&content).map_err(|e| McpCheckError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Recursively merge `overlay` into `base`.
///
/// Mappings merge key by key; any other overlay value (including
/// sequences) replaces the base value outright. A null overlay value
/// removes the key so the schema default applies again.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut out = base_map.clone();
            for (key, value) in overlay_map {
                if value.is_null() {
                    out.remove(key);
                    continue;
                }
                let merged = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::Mapping(out)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StoreKind;
    use tempfile::TempDir;

    fn write_project_config(temp: &TempDir, yaml: &str) -> PathBuf {
        let dir = temp.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yml");
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn missing_config_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), None).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn project_config_is_loaded() {
        let temp = TempDir::new().unwrap();
        write_project_config(&temp, "retry:\n  max_attempts: 7\n");
        let config = load_config(temp.path(), None).unwrap();
        assert_eq!(config.retry.max_attempts, 7);
    }

    #[test]
    fn explicit_config_overrides_project() {
        let temp = TempDir::new().unwrap();
        write_project_config(&temp, "retry:\n  max_attempts: 7\n  backoff_base_ms: 10\n");
        let explicit = temp.path().join("ci.yml");
        fs::write(&explicit, "retry:\n  max_attempts: 1\nstore:\n  kind: rest\n").unwrap();

        let config = load_config(temp.path(), Some(&explicit)).unwrap();
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.backoff_base_ms, 10);
        assert_eq!(config.store.kind, StoreKind::Rest);
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yml");
        let err = load_config(temp.path(), Some(&missing)).unwrap_err();
        assert!(matches!(err, McpCheckError::ConfigNotFound { .. }));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let temp = TempDir::new().unwrap();
        write_project_config(&temp, "retry: [unclosed");
        let err = load_config(temp.path(), None).unwrap_err();
        assert!(matches!(err, McpCheckError::ConfigParseError { .. }));
    }

    #[test]
    fn wrong_type_is_parse_error() {
        let temp = TempDir::new().unwrap();
        write_project_config(&temp, "retry:\n  max_attempts: lots\n");
        let err = load_config(temp.path(), None).unwrap_err();
        assert!(matches!(err, McpCheckError::ConfigParseError { .. }));
    }

    #[test]
    fn empty_file_is_treated_as_no_overrides() {
        let temp = TempDir::new().unwrap();
        write_project_config(&temp, "");
        let config = load_config(temp.path(), None).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn deep_merge_replaces_sequences() {
        let base: Value = serde_yaml::from_str("methods:\n  allowed: [npx, pip]\n").unwrap();
        let overlay: Value = serde_yaml::from_str("methods:\n  allowed: [uvx]\n").unwrap();
        let merged = deep_merge(&base, &overlay);
        let config: HarnessConfig = serde_yaml::from_value(merged).unwrap();
        assert_eq!(config.methods.allowed, vec!["uvx".to_string()]);
    }

    #[test]
    fn deep_merge_null_removes_key() {
        let base: Value = serde_yaml::from_str("delays:\n  settle_ms: 5\n").unwrap();
        let overlay: Value = serde_yaml::from_str("delays:\n  settle_ms: null\n").unwrap();
        let merged = deep_merge(&base, &overlay);
        let config: HarnessConfig = serde_yaml::from_value(merged).unwrap();
        assert_eq!(config.delays.settle_ms, 2_000);
    }
}
