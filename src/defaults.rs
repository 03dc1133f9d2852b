//! Default locations for chart-sync.

use std::path::PathBuf;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CHART_SYNC_CONFIG";

/// Configuration file used when neither `--config` nor `CHART_SYNC_CONFIG`
/// is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/application.yaml";

/// Returns the default root for source repository caches.
///
/// Uses the platform cache directory (`~/.cache/chart-sync` on Linux,
/// `~/Library/Caches/chart-sync` on macOS) and falls back to
/// `.chart-sync-cache` in the current directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".chart-sync-cache"))
        .join("chart-sync")
}

/// Returns the default parent directory for destination working copies.
pub fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("chart-sync")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root() {
        let cache_root = default_cache_root();
        assert!(cache_root.ends_with("chart-sync"));
        assert!(
            cache_root.is_absolute() || cache_root.starts_with(".chart-sync-cache"),
            "Expected absolute path or fallback, got: {:?}",
            cache_root
        );
    }

    #[test]
    fn test_default_work_root_is_under_temp() {
        assert!(default_work_root().starts_with(std::env::temp_dir()));
    }
}
