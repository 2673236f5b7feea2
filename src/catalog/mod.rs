//! Subject catalog: what can be installed, and how.

pub mod env_template;
pub mod loader;
pub mod method;
pub mod subject;

pub use env_template::{EnvTemplate, PLACEHOLDER_VALUE};
pub use loader::{load_catalog, parse_catalog};
pub use method::{CommandSpec, Ecosystem, InstallMethod, MethodKind, RawInstallMethod};
pub use subject::{ConfigOption, Subject};
