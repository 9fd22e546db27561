use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "clinical-insights";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on a single rule evaluation before it is treated as failed.
pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable naming a JSON benchmark override file.
pub const BENCHMARKS_PATH_ENV: &str = "CLINICAL_INSIGHTS_BENCHMARKS";

/// Log filter used when `RUST_LOG` is unset.
/// Debug builds include per-rule outcomes.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,clinical_insights=debug"
    } else {
        "info"
    }
}

/// Benchmark override file, if one is configured.
pub fn benchmarks_path() -> Option<PathBuf> {
    std::env::var_os(BENCHMARKS_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
