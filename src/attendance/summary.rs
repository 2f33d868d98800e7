//! Per-day summary persistence with checksum-based staleness detection.
//!
//! Each day folder may hold a summary/meta pair per [`SummaryKind`]. The meta
//! file maps every source filename to its SHA-256, and a summary is reused
//! only while that map still describes the folder exactly.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::{parse_day_folder, DayEvidence, DayExtractor, EvidenceRecord, Metadata, SummaryKind};
use crate::error::AttendanceError;
use crate::logging::SharedSink;

/// SHA-256 hex digest of a file's bytes.
pub fn file_checksum(path: &Path) -> std::result::Result<String, AttendanceError> {
    let bytes = fs::read(path).map_err(|e| AttendanceError::io(path, e))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Builds metadata for `sources`; unreadable files are left out.
pub fn build_metadata(sources: &[PathBuf], sink: &SharedSink) -> Metadata {
    let mut meta = Metadata::new();
    for path in sources {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        match file_checksum(path) {
            Ok(sum) => {
                meta.insert(name, sum);
            }
            Err(e) => sink.warn(&e.to_string()),
        }
    }
    meta
}

/// Reads and writes daily summaries under the attendance root.
pub struct SummaryStore {
    root: PathBuf,
    force_recompute: bool,
    window: Option<(NaiveDate, u32)>,
    sink: SharedSink,
}

impl SummaryStore {
    pub fn new(root: PathBuf, force_recompute: bool, sink: SharedSink) -> Self {
        Self {
            root,
            force_recompute,
            window: None,
            sink,
        }
    }

    /// Limits [`collect_all`](Self::collect_all) to folders at most
    /// `lookback_days` before `today`.
    pub fn with_window(mut self, today: NaiveDate, lookback_days: u32) -> Self {
        self.window = Some((today, lookback_days));
        self
    }

    /// True only if both files exist, every recorded file still has its
    /// checksum, and no source file was added since.
    pub fn validate(&self, folder: &Path, kind: SummaryKind, current_sources: &[PathBuf]) -> bool {
        let summary_path = folder.join(kind.summary_file());
        let meta_path = folder.join(kind.meta_file());
        if !summary_path.exists() || !meta_path.exists() {
            return false;
        }

        let recorded = match read_json::<Metadata>(&meta_path) {
            Ok(meta) => meta,
            Err(e) => {
                self.sink.error(&format!(
                    "Failed to verify summary integrity at {}: {:#}",
                    folder.display(),
                    e
                ));
                return false;
            }
        };

        for (file_name, old_checksum) in &recorded {
            let path = folder.join(file_name);
            match file_checksum(&path) {
                Ok(sum) if &sum == old_checksum => {}
                _ => return false,
            }
        }

        let mut current: Vec<String> = current_sources
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        current.sort();
        current.iter().eq(recorded.keys())
    }

    /// Loads a persisted summary, or `None` if missing or unreadable.
    pub fn load(&self, folder: &Path, kind: SummaryKind) -> Option<Vec<EvidenceRecord>> {
        let path = folder.join(kind.summary_file());
        if !path.exists() {
            return None;
        }
        match read_json(&path) {
            Ok(records) => Some(records),
            Err(e) => {
                self.sink.error(&format!("Failed to load summary {}: {:#}", path.display(), e));
                None
            }
        }
    }

    /// Writes the summary and its metadata, replacing any previous pair.
    pub fn save(&self, folder: &Path, kind: SummaryKind, records: &[EvidenceRecord], meta: &Metadata) -> Result<()> {
        fs::create_dir_all(folder)
            .with_context(|| format!("Failed to create {}", folder.display()))?;
        write_json(&folder.join(kind.summary_file()), &records)?;
        write_json(&folder.join(kind.meta_file()), meta)?;
        Ok(())
    }

    /// Returns the day's evidence, reusing the persisted summary when it is
    /// still valid and re-extracting otherwise.
    pub fn day_evidence(&self, day: NaiveDate, folder: &Path, extractor: &dyn DayExtractor) -> Option<Vec<EvidenceRecord>> {
        let kind = extractor.kind();
        let sources = extractor.source_files(folder);

        if !self.force_recompute && self.validate(folder, kind, &sources) {
            match self.load(folder, kind) {
                Some(records) => return (!records.is_empty()).then_some(records),
                None => self
                    .sink
                    .warn(&format!("Discarding unreadable summary in \"{}\".", day)),
            }
        }

        self.sink.debug(&format!(
            "Summary not found or outdated in \"{}\". Rebuilding...",
            day
        ));
        let records = extractor.extract(day, folder)?;
        let meta = build_metadata(&sources, &self.sink);

        match self.save(folder, kind, &records, &meta) {
            Ok(()) => self
                .sink
                .info(&format!("Saved summary and meta to \"{}\".", day)),
            Err(e) => self
                .sink
                .error(&format!("Failed to save summary/meta in \"{}\": {:#}", day, e)),
        }
        Some(records)
    }

    /// Gathers evidence for every `YYYY-MM-DD` folder under the root that
    /// falls inside the window, if one is set.
    pub fn collect_all(&self, extractor: &dyn DayExtractor) -> DayEvidence {
        let mut by_day = DayEvidence::new();
        for (day, folder) in self.day_folders() {
            if let Some((today, lookback)) = self.window {
                if (today - day).num_days() > lookback as i64 {
                    continue;
                }
            }
            if let Some(records) = self.day_evidence(day, &folder, extractor) {
                by_day.insert(day, records);
            }
        }
        by_day
    }

    /// Day folders under the root, oldest first.
    pub fn day_folders(&self) -> Vec<(NaiveDate, PathBuf)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                self.sink
                    .warn(&AttendanceError::io(&self.root, e).to_string());
                return Vec::new();
            }
        };

        let mut folders: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                let day = parse_day_folder(p.file_name()?.to_str()?)?;
                Some((day, p))
            })
            .collect();
        folders.sort();
        folders
    }

    /// Deletes every summary and meta file of both kinds; returns the count.
    pub fn clear_summaries(&self) -> usize {
        let mut deleted = 0;
        for (_, folder) in self.day_folders() {
            for kind in SummaryKind::ALL {
                for name in [kind.summary_file(), kind.meta_file()] {
                    let path = folder.join(name);
                    if !path.exists() {
                        continue;
                    }
                    match fs::remove_file(&path) {
                        Ok(()) => {
                            self.sink
                                .warn(&format!("Removed daily summary: \"{}\".", path.display()));
                            deleted += 1;
                        }
                        Err(e) => self.sink.error(&AttendanceError::io(&path, e).to_string()),
                    }
                }
            }
        }
        deleted
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
