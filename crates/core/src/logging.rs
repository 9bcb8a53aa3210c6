//! File-backed tracing setup for hosts embedding the panel.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a global subscriber writing daily-rolled files named after
/// `component` under `dir` (default `~/.reftree/logs`), optionally mirroring
/// to stderr. Returns the guard that flushes the writer on drop; a subscriber
/// installed earlier in the process wins silently.
pub fn init_logging(component: &str, dir: Option<PathBuf>, to_stderr: bool) -> WorkerGuard {
    let dir = dir.unwrap_or_else(default_log_dir);
    let _ = std::fs::create_dir_all(&dir);

    let appender = tracing_appender::rolling::daily(&dir, component);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if to_stderr {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        let _ = registry.with(stderr_layer).try_init();
    } else {
        let _ = registry.try_init();
    }

    guard
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".reftree").join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_within_a_process() {
        let dir = std::env::temp_dir().join("reftree-log-test");
        let _g1 = init_logging("test", Some(dir.clone()), false);
        let _g2 = init_logging("test", Some(dir.clone()), false);
        tracing::info!("logging smoke test");
        assert!(dir.exists());
    }
}
