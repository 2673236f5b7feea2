//! Aggregation, readiness and report files.

pub mod readiness;
pub mod render;
pub mod store;
pub mod summary;

pub use readiness::{
    assess, classify, environment_compat_rate, recommendations, QualityMetrics, Verdict,
};
pub use render::render_markdown;
pub use store::{ReportStore, SavedReport};
pub use summary::{summarize, ErrorCount, ExhaustedItem, MethodStats, SessionSummary, TimingStats};
