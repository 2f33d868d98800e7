use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::AttendanceConfig;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the default config location: `<exe_dir>/config.json`
pub fn default_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the runtime log file: `<exe_dir>/log/attendance.log`
pub fn default_log_path() -> PathBuf {
    get_exe_dir().join("log").join("attendance.log")
}

/// Resolves `path` against `base` unless it is already absolute.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Rewrites every relative directory in `config` to live under `base`.
pub fn anchor_config(mut config: AttendanceConfig, base: &Path) -> AttendanceConfig {
    config.attendance_dir = resolve(base, &config.attendance_dir);
    config.cache_dir = resolve(base, &config.cache_dir);
    config.debug_dir = resolve(base, &config.debug_dir);
    config.anchor_template = resolve(base, &config.anchor_template);
    config
}

/// Ensures all working directories exist. Call at startup.
pub fn ensure_directories(config: &AttendanceConfig) -> std::io::Result<()> {
    std::fs::create_dir_all(&config.attendance_dir)?;
    std::fs::create_dir_all(&config.cache_dir)?;
    if config.debug_images {
        std::fs::create_dir_all(&config.debug_dir)?;
    }
    Ok(())
}
