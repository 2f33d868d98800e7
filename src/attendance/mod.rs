//! Per-day evidence extraction, persistence and interval folding.

pub mod interval;
pub mod pipeline;
pub mod screenshot;
pub mod summary;
pub mod textfile;

pub use interval::{IntervalAggregator, IntervalBuckets};
pub use pipeline::{AttendancePipeline, EvidenceSource};
pub use screenshot::ScreenshotExtractor;
pub use summary::SummaryStore;
pub use textfile::TextFileExtractor;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::CacheType;

/// Folder names are calendar days in this format.
pub const DAY_FOLDER_FORMAT: &str = "%Y-%m-%d";

/// One player's attendance on one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub name: String,
    pub attendance: u32,
    /// Preprocessing variants that recognized the name (screenshot path only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<Vec<String>>,
}

impl EvidenceRecord {
    pub fn new(name: impl Into<String>, attendance: u32) -> Self {
        Self {
            name: name.into(),
            attendance,
            ocr: None,
        }
    }
}

/// Source filename to content checksum.
pub type Metadata = BTreeMap<String, String>;

/// Evidence keyed by calendar day.
pub type DayEvidence = BTreeMap<NaiveDate, Vec<EvidenceRecord>>;

/// Which extraction path a daily summary belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryKind {
    Screenshot,
    TextFile,
}

impl SummaryKind {
    pub const ALL: [SummaryKind; 2] = [SummaryKind::Screenshot, SummaryKind::TextFile];

    pub fn summary_file(&self) -> &'static str {
        match self {
            SummaryKind::Screenshot => "screenshot_summary.json",
            SummaryKind::TextFile => "text_summary.json",
        }
    }

    pub fn meta_file(&self) -> &'static str {
        match self {
            SummaryKind::Screenshot => "screenshot_meta.meta",
            SummaryKind::TextFile => "text_meta.meta",
        }
    }

    /// Cache bucket for interval results built from this kind.
    pub fn cache_type(&self) -> CacheType {
        match self {
            SummaryKind::Screenshot => CacheType::Screenshot,
            SummaryKind::TextFile => CacheType::TextFile,
        }
    }
}

/// Turns one day folder into evidence records.
pub trait DayExtractor {
    fn kind(&self) -> SummaryKind;

    /// Files in `folder` whose checksums make up the day's metadata.
    fn source_files(&self, folder: &Path) -> Vec<PathBuf>;

    /// Extracts the day's evidence; `None` means the day yields no summary.
    fn extract(&self, day: NaiveDate, folder: &Path) -> Option<Vec<EvidenceRecord>>;
}

/// Parses a `YYYY-MM-DD` folder name.
pub fn parse_day_folder(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DAY_FOLDER_FORMAT).ok()
}

/// Lists files in `folder` whose lowercased extension is in `extensions`,
/// sorted by name. An unreadable folder yields an empty list.
pub fn files_with_extensions(folder: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    files
}
