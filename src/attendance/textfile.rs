//! Parser for the in-game guild roster export.
//!
//! The export is tab-delimited with a fixed header. Values may be wrapped in
//! double quotes, which are stripped.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{files_with_extensions, DayExtractor, EvidenceRecord, SummaryKind};
use crate::error::{AttendanceError, Result};
use crate::logging::SharedSink;

const EXPECTED_HEADER: [&str; 3] = ["Character Name", "Last Seen", "Roles"];
const ONLINE: &str = "Online";

/// Returns the names of players flagged online, one entry per row.
pub fn parse_export(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| AttendanceError::io(path, e))?;
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    let header: Vec<String> = match lines.next() {
        Some(line) => line.replace('"', "").split('\t').map(str::to_string).collect(),
        None => return Err(AttendanceError::parse(path, "file is empty")),
    };
    if header != EXPECTED_HEADER {
        return Err(AttendanceError::parse(
            path,
            format!("unexpected header {:?}", header),
        ));
    }

    let mut online = Vec::new();
    for line in lines {
        let line = line.replace('"', "");
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 2 && parts[1].trim() == ONLINE {
            online.push(parts[0].trim().to_string());
        }
    }
    Ok(online)
}

/// Counts repeated names; records come out sorted by name.
pub fn tally(names: &[String]) -> Vec<EvidenceRecord> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for name in names {
        *counts.entry(name.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| EvidenceRecord::new(name, count))
        .collect()
}

/// Day extractor for folders holding a roster export `.txt`.
pub struct TextFileExtractor {
    sink: SharedSink,
}

impl TextFileExtractor {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }
}

impl DayExtractor for TextFileExtractor {
    fn kind(&self) -> SummaryKind {
        SummaryKind::TextFile
    }

    /// Only the first export by name is used.
    fn source_files(&self, folder: &Path) -> Vec<PathBuf> {
        files_with_extensions(folder, &["txt"]).into_iter().take(1).collect()
    }

    fn extract(&self, day: NaiveDate, folder: &Path) -> Option<Vec<EvidenceRecord>> {
        let Some(path) = self.source_files(folder).into_iter().next() else {
            self.sink.warn(&format!(
                "No .txt file found in {}: {}",
                day,
                AttendanceError::SourceMissing(folder.to_path_buf())
            ));
            return None;
        };

        let names = match parse_export(&path) {
            Ok(names) => names,
            Err(e) => {
                self.sink.warn(&e.to_string());
                return None;
            }
        };
        if names.is_empty() {
            self.sink
                .warn(&format!("No valid player entries in {}", path.display()));
            return None;
        }

        self.sink.info(&format!("Read attendance from file: {}", path.display()));
        Some(tally(&names))
    }
}
