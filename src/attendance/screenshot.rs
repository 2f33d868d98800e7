//! Screenshot day extraction.
//!
//! Each image goes through detect -> preprocess -> recognize -> match. A name
//! counts once per region no matter how many variants read it, and a day's
//! attendance for a name is the number of regions it was read in.

use chrono::NaiveDate;
use image::{DynamicImage, RgbaImage};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{files_with_extensions, DayExtractor, EvidenceRecord, SummaryKind};
use crate::error::AttendanceError;
use crate::logging::SharedSink;
use crate::ocr::preprocess::enlarge;
use crate::ocr::{recognize_region, AnchorDetector, NameRegion, RosterMatcher, TextRecognizer, Variant};

/// Screenshot extensions considered, compared lowercase.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Names read in one region, each kept once, with every variant that read it.
#[derive(Debug, Default)]
pub struct RegionMatches {
    names: BTreeMap<String, BTreeSet<Variant>>,
}

impl RegionMatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a match; returns true the first time `name` is seen here.
    pub fn record(&mut self, name: &str, variant: Variant) -> bool {
        match self.names.get_mut(name) {
            Some(variants) => {
                variants.insert(variant);
                false
            }
            None => {
                self.names.insert(name.to_string(), BTreeSet::from([variant]));
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct NameTally {
    regions: u32,
    variants: BTreeSet<Variant>,
}

/// Accumulates region matches across every image of a day.
#[derive(Debug, Default)]
pub struct DayTally {
    names: BTreeMap<String, NameTally>,
}

impl DayTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, region: RegionMatches) {
        for (name, variants) in region.names {
            let entry = self.names.entry(name).or_default();
            entry.regions += 1;
            entry.variants.extend(variants);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// One record per name, sorted by name, with variant labels attached.
    pub fn into_records(self) -> Vec<EvidenceRecord> {
        self.names
            .into_iter()
            .map(|(name, tally)| EvidenceRecord {
                name,
                attendance: tally.regions,
                ocr: Some(tally.variants.iter().map(|v| v.label().to_string()).collect()),
            })
            .collect()
    }
}

/// Day extractor for folders of guild-screen screenshots.
pub struct ScreenshotExtractor {
    detector: AnchorDetector,
    recognizer: Arc<dyn TextRecognizer>,
    matcher: RosterMatcher,
    today: NaiveDate,
    lookback_days: u32,
    debug_dir: Option<PathBuf>,
    sink: SharedSink,
}

impl ScreenshotExtractor {
    pub fn new(
        detector: AnchorDetector,
        recognizer: Arc<dyn TextRecognizer>,
        matcher: RosterMatcher,
        today: NaiveDate,
        lookback_days: u32,
        sink: SharedSink,
    ) -> Self {
        Self {
            detector,
            recognizer,
            matcher,
            today,
            lookback_days,
            debug_dir: None,
            sink,
        }
    }

    /// Writes intermediate images under `dir/<day>/`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// Runs every region of one screenshot through recognition and adds the
    /// per-region matches to `tally`. Returns the names read in this image.
    pub fn process_image(&self, img: &RgbaImage, tally: &mut DayTally, debug: Option<&DebugWriter>) -> BTreeSet<String> {
        let enlarged = enlarge(img, self.detector.config().enlarge_factor);
        if let Some(debug) = debug {
            debug.save(enlarged.clone(), "s0_enlarged");
        }

        let regions = self.detector.detect_enlarged(&enlarged);
        let mut image_names = BTreeSet::new();

        for (idx, region) in regions.iter().enumerate() {
            if let Some(debug) = debug {
                debug.save_region(region, idx);
            }

            let mut matches = RegionMatches::new();
            for (name, variant) in recognize_region(region, self.recognizer.as_ref(), &self.matcher, self.sink.as_ref()) {
                matches.record(&name, variant);
            }

            if matches.is_empty() {
                self.sink.debug(&format!("[Region {}] No matched player.", idx));
                continue;
            }
            for name in matches.names() {
                self.sink.debug(&format!("[Region {}] Matched player name: \"{}\".", idx, name));
                image_names.insert(name.to_string());
            }
            tally.add_region(matches);
        }

        image_names
    }
}

impl DayExtractor for ScreenshotExtractor {
    fn kind(&self) -> SummaryKind {
        SummaryKind::Screenshot
    }

    fn source_files(&self, folder: &Path) -> Vec<PathBuf> {
        files_with_extensions(folder, &IMAGE_EXTENSIONS)
    }

    fn extract(&self, day: NaiveDate, folder: &Path) -> Option<Vec<EvidenceRecord>> {
        let age = (self.today - day).num_days();
        if age > self.lookback_days as i64 {
            self.sink
                .debug(&format!("Skipping {}: older than {} days.", day, self.lookback_days));
            return None;
        }
        if self.matcher.is_empty() {
            self.sink
                .error("Roster is empty; screenshots cannot be matched.");
            return None;
        }

        let images = self.source_files(folder);
        if images.is_empty() {
            self.sink
                .warn(&AttendanceError::SourceMissing(folder.to_path_buf()).to_string());
            return None;
        }

        self.sink
            .info(&format!("Processing screenshot folder: \"{}\".", day));
        let mut tally = DayTally::new();

        for path in &images {
            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let img = match image::open(path) {
                Ok(img) => img.to_rgba8(),
                Err(e) => {
                    self.sink
                        .warn(&AttendanceError::parse(path, e.to_string()).to_string());
                    continue;
                }
            };

            self.sink.info(&format!("Processing image: \"{}\".", file_name));
            let debug = self
                .debug_dir
                .as_ref()
                .map(|dir| DebugWriter::new(dir.join(day.to_string()), &file_name, self.sink.clone()));
            let names = self.process_image(&img, &mut tally, debug.as_ref());
            self.sink.debug(&format!(
                "Matched players from image \"{}\": {:?}",
                file_name, names
            ));
        }

        if tally.is_empty() {
            self.sink
                .warn(&format!("No valid screenshot data found in \"{}\".", day));
            return None;
        }

        let records = tally.into_records();
        self.sink.info(&format!(
            "Completed folder \"{}\" with {} player entries.",
            day,
            records.len()
        ));
        Some(records)
    }
}

/// Saves intermediate images for one screenshot.
pub struct DebugWriter {
    dir: PathBuf,
    stem: String,
    sink: SharedSink,
}

impl DebugWriter {
    pub fn new(dir: PathBuf, file_name: &str, sink: SharedSink) -> Self {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        Self { dir, stem, sink }
    }

    fn save(&self, img: impl Into<DynamicImage>, suffix: &str) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            self.sink
                .debug(&AttendanceError::io(&self.dir, e).to_string());
            return;
        }
        let path = self.dir.join(format!("{}_{}.png", self.stem, suffix));
        let img: DynamicImage = img.into();
        if let Err(e) = img.save(&path) {
            self.sink
                .debug(&format!("Failed to save debug image {}: {}", path.display(), e));
        }
    }

    fn save_region(&self, region: &NameRegion, idx: usize) {
        self.save(region.image.clone(), &format!("s1_extracted_{}", idx));
        for variant in Variant::ALL {
            let rendered = variant.apply(&region.image);
            self.save(rendered, &format!("s2_preprocessed_{}_{}", idx, variant.label()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_counts_name_once_across_variants() {
        let mut region = RegionMatches::new();
        assert!(region.record("Alice", Variant::Contrast));
        assert!(!region.record("Alice", Variant::Adaptive));
        assert!(region.record("Bob", Variant::KernelSharpen));

        let mut tally = DayTally::new();
        tally.add_region(region);
        let records = tally.into_records();

        assert_eq!(records[0].name, "Alice");
        assert_eq!(records[0].attendance, 1);
        assert_eq!(records[0].ocr, Some(vec!["v1".to_string(), "v4".to_string()]));
        assert_eq!(records[1].name, "Bob");
        assert_eq!(records[1].attendance, 1);
    }

    #[test]
    fn test_attendance_is_number_of_regions() {
        let mut tally = DayTally::new();
        for variant in [Variant::Contrast, Variant::ContrastSharpen, Variant::Contrast] {
            let mut region = RegionMatches::new();
            region.record("Alice", variant);
            tally.add_region(region);
        }

        let records = tally.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attendance, 3);
        assert_eq!(records[0].ocr, Some(vec!["v1".to_string(), "v2".to_string()]));
    }

    #[test]
    fn test_empty_regions_do_not_create_entries() {
        let mut tally = DayTally::new();
        tally.add_region(RegionMatches::new());
        assert!(tally.is_empty());
    }
}
