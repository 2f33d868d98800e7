use image::GrayImage;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use crate::config::OcrConfig;
use crate::error::{AttendanceError, Result};

/// How often a running tesseract process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Single-line text recognition over a preprocessed crop.
pub trait TextRecognizer {
    /// Returns the trimmed text of `img`, or an empty string when nothing
    /// was read.
    fn recognize_line(&self, img: &GrayImage) -> Result<String>;
}

/// Runs the external `tesseract` binary in single-line mode.
pub struct TesseractRecognizer {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    language: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(executable: PathBuf, tessdata: Option<PathBuf>, language: &str, timeout: Duration) -> Self {
        Self {
            executable,
            tessdata,
            language: language.to_string(),
            timeout,
        }
    }

    /// Locates tesseract from the config, the local data dir or PATH.
    pub fn from_config(config: &OcrConfig) -> anyhow::Result<Self> {
        let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
        let tessdata = find_tessdata_dir(config.tessdata_dir.as_deref());
        Ok(Self::new(
            executable,
            tessdata,
            &config.language,
            Duration::from_secs(config.timeout_secs.max(1)),
        ))
    }

    /// Spawns tesseract and waits at most `self.timeout` for it to exit.
    fn run(&self, input: &NamedTempFile, output_base: &str) -> Result<()> {
        let mut command = Command::new(&self.executable);
        command
            .arg(input.path())
            .arg(output_base)
            .arg("--psm")
            .arg("7") // Treat the image as a single text line
            .arg("-l")
            .arg(&self.language);
        if let Some(dir) = &self.tessdata {
            command.arg("--tessdata-dir").arg(dir);
        }

        let mut child = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AttendanceError::Recognizer(format!("failed to start tesseract: {}", e)))?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(AttendanceError::Recognizer(format!(
                        "tesseract exited with {}",
                        status
                    )));
                }
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AttendanceError::Recognizer(format!(
                        "tesseract timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(AttendanceError::Recognizer(format!(
                        "failed to wait for tesseract: {}",
                        e
                    )));
                }
            }
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize_line(&self, img: &GrayImage) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png").map_err(|e| AttendanceError::io(std::env::temp_dir(), e))?;
        img.save(temp_input.path())
            .map_err(|e| AttendanceError::Recognizer(format!("failed to write crop: {}", e)))?;

        // Tesseract appends .txt to the output base
        let temp_output = NamedTempFile::new().map_err(|e| AttendanceError::io(std::env::temp_dir(), e))?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        self.run(&temp_input, &output_base)?;

        let txt_path = format!("{}.txt", output_base);
        let text = fs::read_to_string(&txt_path).map_err(|e| AttendanceError::io(&txt_path, e))?;
        let _ = fs::remove_file(&txt_path);

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_missing_executable_is_a_recognizer_error() {
        let recognizer = TesseractRecognizer::new(
            PathBuf::from("/definitely/not/tesseract"),
            None,
            "eng",
            Duration::from_secs(1),
        );
        let img = GrayImage::from_pixel(20, 10, Luma([255]));

        let err = recognizer.recognize_line(&img).unwrap_err();
        assert!(matches!(err, AttendanceError::Recognizer(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_process_is_killed_after_timeout() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tesseract");
        let mut file = fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\nsleep 30").unwrap();
        drop(file);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let recognizer = TesseractRecognizer::new(script, None, "eng", Duration::from_millis(200));
        let img = GrayImage::from_pixel(20, 10, Luma([255]));

        let started = Instant::now();
        let err = recognizer.recognize_line(&img).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_is_trimmed() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tesseract");
        let mut file = fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\nprintf '  Alice \\n\\n' > \"$2.txt\"").unwrap();
        drop(file);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let recognizer = TesseractRecognizer::new(script, None, "eng", Duration::from_secs(5));
        let img = GrayImage::from_pixel(20, 10, Luma([255]));

        assert_eq!(recognizer.recognize_line(&img).unwrap(), "Alice");
    }
}
