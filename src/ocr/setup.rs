use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Returns the directory for a locally bundled Tesseract
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("guild-attendance")
        .join("tesseract")
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    }
}

/// Finds the tesseract executable.
///
/// Tries, in order: the configured path, the local data directory, `PATH`,
/// and the usual Windows install locations.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configured tesseract not found: {}", path.display()));
    }

    let local = get_tesseract_dir().join(executable_name());
    if local.exists() {
        return Ok(local);
    }

    let on_path = Command::new("tesseract")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success());
    if on_path {
        return Ok(PathBuf::from("tesseract"));
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    ];
    for path in &common_paths {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(anyhow!(
        "Could not find Tesseract. Install Tesseract-OCR and add it to PATH, \
         set ocr.tesseract_path in config.json, or copy it to: {}",
        get_tesseract_dir().display()
    ))
}

/// Finds a tessdata directory, if one should be passed explicitly.
///
/// `None` lets tesseract use its compiled-in default.
pub fn find_tessdata_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }

    let local = get_tesseract_dir().join("tessdata");
    if local.is_dir() {
        return Some(local);
    }

    std::env::var_os("TESSDATA_PREFIX")
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_executable_wins() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("tesseract");
        std::fs::write(&exe, b"").unwrap();

        assert_eq!(find_tesseract_executable(Some(&exe)).unwrap(), exe);
    }

    #[test]
    fn test_missing_configured_executable_is_an_error() {
        let result = find_tesseract_executable(Some(Path::new("/no/such/tesseract")));
        assert!(result.is_err());
    }

    #[test]
    fn test_configured_tessdata_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_tessdata_dir(Some(dir.path())), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_tesseract_dir_is_app_scoped() {
        assert!(get_tesseract_dir().ends_with("guild-attendance/tesseract"));
    }
}
