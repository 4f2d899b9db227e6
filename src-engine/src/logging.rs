//! Tracing subscriber setup.
//!
//! Development builds log to stderr at debug level. Production builds write
//! daily-rotated files under the platform log directory.

use signflow_common::logging::{app_log_path, ensure_log_dir};
use signflow_common::{runtime_mode, RuntimeMode};
use std::path::Path;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "signflow";
const MAX_LOG_FILES: usize = 5;

fn file_appender(dir: &Path) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// `verbose` raises the default level to debug. `RUST_LOG` overrides both.
/// The returned guard flushes buffered file output and must be held until
/// exit. Calling this twice is harmless; the second call does nothing.
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    match runtime_mode() {
        RuntimeMode::Production => {
            if let Err(e) = ensure_log_dir() {
                eprintln!("Warning: Failed to create log directory, using temp dir: {}", e);
            }

            let log_path = app_log_path();
            let log_dir = log_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir);

            let appender = file_appender(&log_dir).or_else(|e| {
                eprintln!("Warning: Failed to create log file appender: {}", e);
                let temp_dir = std::env::temp_dir().join("signflow-logs");
                let _ = std::fs::create_dir_all(&temp_dir);
                file_appender(&temp_dir)
            });

            let appender = match appender {
                Ok(appender) => appender,
                Err(e) => {
                    eprintln!("Warning: File logging unavailable, logging to stderr: {}", e);
                    init_console(if verbose { "debug" } else { "warn" });
                    return None;
                }
            };

            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter(if verbose { "debug" } else { "info" }))
                .with_writer(non_blocking)
                .with_ansi(false)
                .try_init()
                .is_ok();

            if installed {
                info!("Production logging initialized in {:?}", log_dir);
            }
            Some(guard)
        }
        RuntimeMode::Development => {
            init_console("debug");
            debug!("Development logging initialized (console only)");
            None
        }
    }
}

fn init_console(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}
