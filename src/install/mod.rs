//! Install phase: package resolution and health probing.

pub mod executor;
pub mod health;
pub mod package;

pub use executor::{InstallPhase, InstallReport, InstallState, InstallationExecutor};
pub use health::{readiness_marker, HealthProbe, HealthReport, StdioHealthProbe};
pub use package::{normalize_pypi, HttpPackageIndex, Lookup, PackageIndex};
