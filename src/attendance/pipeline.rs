//! End-to-end attendance computation for one evidence source.
//!
//! Cached interval buckets are returned when fresh; otherwise every day folder
//! goes through the summary store, the results are folded into trailing
//! windows, and the buckets are cached for the next caller.

use chrono::{Local, NaiveDate};
use std::fmt;
use std::sync::Arc;

use super::{
    DayEvidence, IntervalAggregator, IntervalBuckets, ScreenshotExtractor, SummaryStore, TextFileExtractor,
};
use crate::cache::{CacheStore, CacheType};
use crate::config::AttendanceConfig;
use crate::logging::SharedSink;
use crate::ocr::{AnchorDetector, RosterMatcher, TesseractRecognizer, TextRecognizer};
use crate::roster::{fetch_killboard, HttpFetcher, JsonSource, RosterProvider};

/// Where attendance evidence comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum EvidenceSource {
    /// Guild-screen screenshots read with OCR
    Screenshot,
    /// In-game roster exports
    Textfile,
    /// Killboard battle statistics
    Killboard,
}

impl EvidenceSource {
    pub fn cache_type(&self) -> CacheType {
        match self {
            EvidenceSource::Screenshot => CacheType::Screenshot,
            EvidenceSource::Textfile => CacheType::TextFile,
            EvidenceSource::Killboard => CacheType::Killboard,
        }
    }
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_type())
    }
}

pub struct AttendancePipeline {
    config: AttendanceConfig,
    cache: CacheStore,
    aggregator: IntervalAggregator,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    json_source: Option<Box<dyn JsonSource>>,
    today: NaiveDate,
    sink: SharedSink,
}

impl AttendancePipeline {
    pub fn new(config: AttendanceConfig, sink: SharedSink) -> Self {
        let cache = CacheStore::from_config(&config, sink.clone());
        let aggregator = IntervalAggregator::new(config.intervals.clone());
        Self {
            config,
            cache,
            aggregator,
            recognizer: None,
            json_source: None,
            today: Local::now().date_naive(),
            sink,
        }
    }

    /// Uses `recognizer` instead of discovering tesseract.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Uses `source` for roster and killboard requests instead of HTTP.
    pub fn with_json_source(mut self, source: Box<dyn JsonSource>) -> Self {
        self.json_source = Some(source);
        self
    }

    /// Pins "today" for window arithmetic.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &AttendanceConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn summary_store(&self, force: bool) -> SummaryStore {
        SummaryStore::new(
            self.config.attendance_dir.clone(),
            force || self.config.force_recompute,
            self.sink.clone(),
        )
    }

    /// Interval buckets for `source`.
    ///
    /// With `force` unset, a cached result is returned as is. Every failure
    /// degrades to empty buckets.
    pub fn interval_attendance(&self, source: EvidenceSource, force: bool) -> IntervalBuckets {
        let cache_type = source.cache_type();
        if !force && !self.config.force_recompute {
            if let Some(buckets) = self.cache.load::<IntervalBuckets>(cache_type) {
                self.sink
                    .info(&format!("Using cached {} attendance.", source));
                return buckets;
            }
        }

        let buckets = match source {
            EvidenceSource::Screenshot => self
                .screenshot_days(force)
                .map(|by_day| self.aggregator.aggregate(&by_day, self.today)),
            EvidenceSource::Textfile => Some(self.aggregator.aggregate(&self.textfile_days(force), self.today)),
            EvidenceSource::Killboard => self.with_json(|json| {
                fetch_killboard(json, &self.config.network, &self.config.intervals, &self.sink)
            }),
        }
        .unwrap_or_else(|| self.aggregator.aggregate(&DayEvidence::new(), self.today));

        if buckets.values().any(|players| !players.is_empty()) {
            self.cache.save(cache_type, &buckets);
        } else {
            self.sink
                .warn(&format!("No {} attendance found. Nothing saved to cache.", source));
        }
        buckets
    }

    /// Per-day evidence from roster exports.
    pub fn textfile_days(&self, force: bool) -> DayEvidence {
        let extractor = TextFileExtractor::new(self.sink.clone());
        self.windowed_store(force).collect_all(&extractor)
    }

    /// Per-day evidence from screenshots; `None` when a prerequisite (roster,
    /// anchor template, recognizer) is unavailable.
    pub fn screenshot_days(&self, force: bool) -> Option<DayEvidence> {
        let roster = self.with_json(|json| {
            RosterProvider::new(
                &self.cache,
                json,
                &self.config.network.members_url,
                self.config.network.guilds.clone(),
                self.sink.clone(),
            )
            .roster()
        })?;
        if roster.is_empty() {
            self.sink
                .error("Player list is empty. Cannot match screenshots.");
            return None;
        }

        let detector = match AnchorDetector::from_file(
            &self.config.anchor_template,
            self.config.detector.clone(),
            self.sink.clone(),
        ) {
            Ok(detector) => detector,
            Err(e) => {
                self.sink.error(&format!("{:#}", e));
                return None;
            }
        };

        let recognizer: Arc<dyn TextRecognizer> = match &self.recognizer {
            Some(recognizer) => recognizer.clone(),
            None => match TesseractRecognizer::from_config(&self.config.ocr) {
                Ok(recognizer) => Arc::new(recognizer),
                Err(e) => {
                    self.sink.error(&format!("{:#}", e));
                    return None;
                }
            },
        };

        let matcher = RosterMatcher::new(roster.into_keys(), self.config.ocr.fuzzy_threshold);
        let mut extractor = ScreenshotExtractor::new(
            detector,
            recognizer,
            matcher,
            self.today,
            self.config.lookback_days(),
            self.sink.clone(),
        );
        if self.config.debug_images {
            extractor = extractor.with_debug_dir(self.config.debug_dir.clone());
        }

        Some(self.windowed_store(force).collect_all(&extractor))
    }

    /// Summary store limited to the longest interval.
    fn windowed_store(&self, force: bool) -> SummaryStore {
        self.summary_store(force)
            .with_window(self.today, self.config.lookback_days())
    }

    /// Runs `f` with the injected JSON source or a fresh HTTP client.
    fn with_json<T>(&self, f: impl FnOnce(&dyn JsonSource) -> T) -> Option<T> {
        if let Some(source) = &self.json_source {
            return Some(f(source.as_ref()));
        }
        match HttpFetcher::new(&self.config.network, self.sink.clone()) {
            Ok(fetcher) => Some(f(&fetcher)),
            Err(e) => {
                self.sink
                    .error(&format!("Failed to build HTTP client: {:#}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::SummaryKind;
    use crate::logging::{LogLevel, MemorySink};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const HEADER: &str = "Character Name\tLast Seen\tRoles";

    fn config(root: &Path) -> AttendanceConfig {
        AttendanceConfig {
            attendance_dir: root.join("attendance"),
            cache_dir: root.join("cache"),
            anchor_template: root.join("missing.png"),
            ..AttendanceConfig::default()
        }
    }

    fn export(root: &Path, day: &str, rows: &[&str]) {
        let folder = root.join("attendance").join(day);
        fs::create_dir_all(&folder).unwrap();
        let body = std::iter::once(HEADER).chain(rows.iter().copied()).collect::<Vec<_>>().join("\n");
        fs::write(folder.join("guild.txt"), body).unwrap();
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 25).unwrap()
    }

    #[test]
    fn test_textfile_buckets_are_computed_then_cached() {
        let dir = tempdir().unwrap();
        export(dir.path(), "2025-04-20", &["Alice\tOnline\tMember", "Alice\tOnline\tMember"]);
        export(dir.path(), "2025-04-12", &["Alice\tOnline\tMember", "Bob\tOnline\tMember"]);
        let pipeline = AttendancePipeline::new(config(dir.path()), Arc::new(MemorySink::new())).with_today(today());

        let buckets = pipeline.interval_attendance(EvidenceSource::Textfile, false);

        assert_eq!(buckets[&7]["Alice"], 2);
        assert_eq!(buckets[&7].get("Bob"), None);
        assert_eq!(buckets[&14]["Alice"], 3);
        assert_eq!(buckets[&28]["Bob"], 1);

        // A new export is ignored until the cached result is bypassed
        export(dir.path(), "2025-04-24", &["Bob\tOnline\tMember"]);
        let cached = pipeline.interval_attendance(EvidenceSource::Textfile, false);
        assert_eq!(cached, buckets);
        let fresh = pipeline.interval_attendance(EvidenceSource::Textfile, true);
        assert_eq!(fresh[&7]["Bob"], 1);
    }

    #[test]
    fn test_folders_past_longest_interval_are_not_summarized() {
        let dir = tempdir().unwrap();
        export(dir.path(), "2024-12-01", &["Carol\tOnline\tMember"]);
        export(dir.path(), "2025-04-24", &["Alice\tOnline\tMember"]);
        let pipeline = AttendancePipeline::new(config(dir.path()), Arc::new(MemorySink::new())).with_today(today());

        let by_day = pipeline.textfile_days(false);

        assert_eq!(by_day.len(), 1);
        let old = dir.path().join("attendance").join("2024-12-01");
        assert!(!old.join(SummaryKind::TextFile.summary_file()).exists());
    }

    #[test]
    fn test_empty_result_is_not_cached() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let pipeline = AttendancePipeline::new(config(dir.path()), sink.clone()).with_today(today());

        let buckets = pipeline.interval_attendance(EvidenceSource::Textfile, false);

        assert_eq!(buckets.keys().copied().collect::<Vec<_>>(), vec![7, 14, 28]);
        assert!(pipeline.cache().load::<IntervalBuckets>(CacheType::TextFile).is_none());
        assert!(sink.contains(LogLevel::Warn, "Nothing saved"));
    }

    #[test]
    fn test_screenshot_without_roster_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let pipeline = AttendancePipeline::new(config(dir.path()), sink.clone())
            .with_json_source(Box::new(crate::roster::fetch::testing::ScriptedSource::default()))
            .with_today(today());

        let buckets = pipeline.interval_attendance(EvidenceSource::Screenshot, false);

        assert!(buckets.values().all(|b| b.is_empty()));
        assert!(sink.contains(LogLevel::Error, "Player list is empty"));
    }
}
