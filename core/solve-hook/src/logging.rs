//! Log setup: stderr plus a daily file under `~/.solvesync/logs`.
//!
//! `SOLVESYNC_DEBUG_LOG=1` forces debug output; otherwise `SOLVESYNC_LOG`
//! takes an `EnvFilter` directive and defaults to `info`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SOLVESYNC_LOG";
const DEBUG_ENV: &str = "SOLVESYNC_DEBUG_LOG";

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn init() -> Option<WorkerGuard> {
    let filter = build_filter();

    let Some(log_dir) = solve_core::get_solvesync_dir().map(|dir| dir.join("logs")) else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return None;
    };

    if let Err(err) = fs_err::create_dir_all(&log_dir) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        tracing::warn!(error = %err, "Log directory unavailable; logging to stderr only");
        return None;
    }

    let appender = tracing_appender::rolling::daily(&log_dir, "solve-hook.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Some(guard)
}

fn build_filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_accepts_truthy_values() {
        assert!(debug_enabled(Some("1")));
        assert!(debug_enabled(Some("yes")));
        assert!(!debug_enabled(Some("0")));
        assert!(!debug_enabled(None));
    }
}
