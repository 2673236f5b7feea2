//! Subjects: the installable units under test.

use serde::{Deserialize, Serialize};

use super::method::RawInstallMethod;

/// An installable MCP server package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable identifier, also the key for attempt records.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "methods", alias = "installMethods")]
    pub install_methods: Vec<RawInstallMethod>,
    #[serde(default, alias = "configOptions")]
    pub config_options: Vec<ConfigOption>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            install_methods: Vec::new(),
            config_options: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: RawInstallMethod) -> Self {
        self.install_methods.push(method);
        self
    }

    pub fn with_option(mut self, option: ConfigOption) -> Self {
        self.config_options.push(option);
        self
    }

    /// A subject with neither methods nor config options cannot be tested.
    pub fn is_testable(&self) -> bool {
        !self.install_methods.is_empty() || !self.config_options.is_empty()
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A setting the server accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigOption {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required: false,
            default: None,
            description: None,
        }
    }
}
