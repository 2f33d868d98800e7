//! Error taxonomy for the extraction engine.
//!
//! Nothing here is fatal to a pass. Callers log the error through their
//! sink and fall back to an empty value.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    /// No usable images or export text in a day folder.
    #[error("no usable source files in {0}")]
    SourceMissing(PathBuf),

    /// Header mismatch, unreadable or corrupt input file.
    #[error("invalid input {path}: {reason}")]
    ParseInvalid { path: PathBuf, reason: String },

    /// OCR text scored below the match threshold.
    #[error("no roster name matched \"{text}\" (best score {score})")]
    RecognitionMiss { text: String, score: u8 },

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry {path} unusable: {reason}")]
    Cache { path: PathBuf, reason: String },

    #[error("request to {context} failed after {attempts} attempts")]
    Network { context: String, attempts: u32 },

    #[error("recognizer failed: {0}")]
    Recognizer(String),
}

impl AttendanceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ParseInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
