//! Log routing for the CLI and the store server.
//!
//! Subcommands print their results (file listings, answers, transcripts) on stdout, so tracing
//! never writes there. Diagnostics go to stderr in compact form and, unless disabled, to a log
//! file as well:
//!
//! - `INDICATOR_DESK_LOG_FILE=<path>` appends to that file, creating its parent directory.
//! - `INDICATOR_DESK_LOG_FILE=off` (or an empty value) keeps logs on stderr only.
//! - Unset, logs are appended to `logs/indicator-desk.log` under the working directory.
//!
//! `RUST_LOG` filters both outputs and defaults to `info`.
use std::ffi::OsStr;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "INDICATOR_DESK_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/indicator-desk.log";

// Flushes buffered file output on drop; held until exit.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Call once, before any other work.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = std::io::stderr();
    let stderr_layer = fmt::layer()
        .with_ansi(stderr.is_terminal())
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    let file_writer = log_file_path(std::env::var_os(LOG_FILE_ENV).as_deref())
        .and_then(|path| open_log_file(&path));
    match file_writer {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Where file logs go for a given `INDICATOR_DESK_LOG_FILE` value, or `None` when disabled.
fn log_file_path(setting: Option<&OsStr>) -> Option<PathBuf> {
    match setting {
        None => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        Some(value) if value.is_empty() || value.eq_ignore_ascii_case("off") => None,
        Some(value) => Some(PathBuf::from(value)),
    }
}

// The subscriber is not installed yet, so failures can only be reported on stderr.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_logs_under_the_working_directory() {
        assert_eq!(log_file_path(None), Some(PathBuf::from("logs/indicator-desk.log")));
    }

    #[test]
    fn explicit_path_is_used_verbatim() {
        assert_eq!(
            log_file_path(Some(OsStr::new("/var/log/desk.log"))),
            Some(PathBuf::from("/var/log/desk.log"))
        );
    }

    #[test]
    fn file_logging_can_be_switched_off() {
        assert_eq!(log_file_path(Some(OsStr::new("off"))), None);
        assert_eq!(log_file_path(Some(OsStr::new("OFF"))), None);
        assert_eq!(log_file_path(Some(OsStr::new(""))), None);
    }

    #[test]
    fn log_file_parent_directories_are_created() {
        let root = std::env::temp_dir().join(format!("indicator-desk-log-{}", uuid::Uuid::new_v4()));
        let path = root.join("nested").join("desk.log");

        assert!(open_log_file(&path).is_some());
        assert!(path.is_file());

        std::fs::remove_dir_all(&root).ok();
    }
}
