//! Platform-specific logging directory resolution.

use std::path::PathBuf;

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/signflow/logs` or `~/.local/state/signflow/logs` |
/// | macOS | `~/Library/Logs/signflow` |
/// | Windows | `%LOCALAPPDATA%/signflow/logs` |
///
/// Falls back to the system temp directory when no home directory can be
/// determined.
pub fn log_dir() -> PathBuf {
    platform_log_dir().unwrap_or_else(|| std::env::temp_dir().join("signflow-logs"))
}

#[cfg(target_os = "linux")]
fn platform_log_dir() -> Option<PathBuf> {
    let base = directories::ProjectDirs::from("io", "signflow", "signflow")?;
    Some(
        base.state_dir()
            .map(|d| d.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs"),
    )
}

#[cfg(target_os = "macos")]
fn platform_log_dir() -> Option<PathBuf> {
    Some(
        dirs::home_dir()?
            .join("Library")
            .join("Logs")
            .join("signflow"),
    )
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_log_dir() -> Option<PathBuf> {
    let base = directories::ProjectDirs::from("io", "signflow", "signflow")?;
    Some(base.data_local_dir().join("logs"))
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir())
}

/// Returns the path to the application log file.
pub fn app_log_path() -> PathBuf {
    log_dir().join("signflow.log")
}
