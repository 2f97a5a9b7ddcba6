use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the data directory and its `logs/` subdirectory exist.
pub fn ensure_directories(data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    std::fs::create_dir_all(data_dir.join("logs"))
        .with_context(|| format!("failed to create {}/logs", data_dir.display()))?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` value to an [`EnvFilter`] directive.
///
/// Accepts the conventional level names (`WARNING`, `CRITICAL`) as well as
/// tracing's own. Unknown values pass through unchanged so that full filter
/// directives such as `monitor_runtime=trace` still work.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        "TRACE" => "trace".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Logs go to stderr. When `log_file` is given, the same events are also
/// appended to that file without ANSI colours.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let data_dir = tmp.path().join(".follow-monitor");

        ensure_directories(&data_dir).expect("ensure_directories should succeed");

        assert!(data_dir.is_dir(), "data dir must exist");
        assert!(data_dir.join("logs").is_dir(), "logs subdir must exist");
    }

    #[test]
    fn test_ensure_directories_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        ensure_directories(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("registry.json"), "{}").unwrap();
        ensure_directories(tmp.path()).unwrap();
        assert!(tmp.path().join("registry.json").exists());
    }

    #[test]
    fn test_ensure_directories_fails_on_file() {
        let tmp = TempDir::new().expect("tempdir");
        let blocker = tmp.path().join("taken");
        std::fs::write(&blocker, "").unwrap();
        assert!(ensure_directories(&blocker).is_err());
    }

    #[test]
    fn test_level_directive_maps_conventional_names() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("ERROR"), "error");
        assert_eq!(level_directive("CRITICAL"), "error");
    }

    #[test]
    fn test_level_directive_passes_directives_through() {
        assert_eq!(
            level_directive("monitor_runtime=trace"),
            "monitor_runtime=trace"
        );
    }
}
