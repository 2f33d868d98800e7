//! Configuration for the attendance engine.
//!
//! Loaded from config.json at startup and handed to each component's
//! constructor. Every field has a default so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogSink;

/// Pixel offset of the name label relative to an anchor match.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelOffset {
    pub x: i32,
    pub y: i32,
}

/// Pixel size of the name label at scale 1.0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

/// Anchor detection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Screenshot and template are enlarged by this factor before matching
    pub enlarge_factor: f32,
    /// Smallest template scale tried
    pub scale_min: f32,
    /// Largest template scale tried (inclusive)
    pub scale_max: f32,
    pub scale_step: f32,
    /// Normalized cross-correlation score a position must reach
    pub match_threshold: f32,
    /// Matches closer than this (px, both axes) are the same anchor
    pub merge_tolerance: u32,
    /// Matches whose y differ by at most this belong to one row
    pub row_tolerance: u32,
    /// Crops whose top-left corners are within this are duplicates
    pub region_tolerance: u32,
    pub name_offset: PixelOffset,
    pub name_size: PixelSize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enlarge_factor: 2.0,
            scale_min: 0.7,
            scale_max: 1.9,
            scale_step: 0.1,
            match_threshold: 0.8,
            merge_tolerance: 10,
            row_tolerance: 3,
            region_tolerance: 5,
            name_offset: PixelOffset { x: -166, y: 0 },
            name_size: PixelSize {
                width: 163,
                height: 35,
            },
        }
    }
}

impl DetectorConfig {
    /// Expands `scale_min..=scale_max` by `scale_step`, rounded to 2 decimals.
    pub fn scales(&self) -> Vec<f32> {
        let mut scales = Vec::new();
        if self.scale_step <= 0.0 || self.scale_max < self.scale_min {
            return scales;
        }
        let steps = ((self.scale_max - self.scale_min) / self.scale_step + 1e-3).floor() as u32;
        for i in 0..=steps {
            let s = self.scale_min + self.scale_step * i as f32;
            scales.push((s * 100.0).round() / 100.0);
        }
        scales
    }
}

/// Recognizer and matcher parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Similarity (0-100) a roster name must exceed to be accepted
    pub fuzzy_threshold: u8,
    /// Explicit tesseract executable; discovered when absent
    pub tesseract_path: Option<PathBuf>,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// A recognizer call running longer than this is killed
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 75,
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub name: String,
    pub id: String,
}

/// Settings for the roster and statistics collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub guilds: Vec<GuildInfo>,
    pub members_url: String,
    pub killboard_url: String,
    pub min_gp: u32,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            guilds: Vec::new(),
            members_url: "https://gameinfo-sgp.albiononline.com/api/gameinfo".to_string(),
            killboard_url: "https://api-east.albionbattles.com/player".to_string(),
            min_gp: 50,
            timeout_secs: 10,
            retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Root holding one `YYYY-MM-DD` folder per day
    pub attendance_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Where intermediate images go when `debug_images` is set
    pub debug_dir: PathBuf,
    /// Anchor image placed beside every player name
    pub anchor_template: PathBuf,
    /// Trailing window lengths in days
    pub intervals: Vec<u32>,
    pub cache_expiry_hours: i64,
    /// Cache entries kept per type after a save
    pub max_cache_versions: usize,
    /// Ignore persisted daily summaries and recompute every day
    pub force_recompute: bool,
    pub debug_images: bool,
    pub detector: DetectorConfig,
    pub ocr: OcrConfig,
    pub network: NetworkConfig,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            attendance_dir: PathBuf::from("attendance_data"),
            cache_dir: PathBuf::from("cache"),
            debug_dir: PathBuf::from("temp_debug"),
            anchor_template: PathBuf::from("app_data").join("button.png"),
            intervals: vec![7, 14, 28],
            cache_expiry_hours: 8,
            max_cache_versions: 1,
            force_recompute: false,
            debug_images: false,
            detector: DetectorConfig::default(),
            ocr: OcrConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl AttendanceConfig {
    /// Number of days scanned back from today.
    pub fn lookback_days(&self) -> u32 {
        self.intervals.iter().copied().max().unwrap_or(0)
    }

    /// Loads configuration from `path`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load(path: &Path, sink: &dyn LogSink) -> Self {
        if !path.exists() {
            sink.info(&format!(
                "{} not found. Using default config.",
                path.display()
            ));
            return Self::default().validated(sink);
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AttendanceConfig>(&contents) {
                Ok(config) => {
                    sink.info(&format!("Config loaded from {}", path.display()));
                    config.validated(sink)
                }
                Err(e) => {
                    sink.warn(&format!(
                        "Failed to parse {}: {}. Using defaults.",
                        path.display(),
                        e
                    ));
                    Self::default().validated(sink)
                }
            },
            Err(e) => {
                sink.warn(&format!(
                    "Failed to read {}: {}. Using defaults.",
                    path.display(),
                    e
                ));
                Self::default().validated(sink)
            }
        }
    }

    /// Replaces values the engine cannot work with.
    pub fn validated(mut self, sink: &dyn LogSink) -> Self {
        self.intervals.retain(|&i| i > 0);
        if self.intervals.is_empty() {
            sink.warn("No positive intervals configured; using 7/14/28.");
            self.intervals = vec![7, 14, 28];
        }
        self.intervals.sort_unstable();
        self.intervals.dedup();

        if self.detector.scale_step <= 0.0 || self.detector.scale_max < self.detector.scale_min {
            sink.warn("Invalid detector scale range; using defaults.");
            let defaults = DetectorConfig::default();
            self.detector.scale_min = defaults.scale_min;
            self.detector.scale_max = defaults.scale_max;
            self.detector.scale_step = defaults.scale_step;
        }
        if self.detector.enlarge_factor <= 0.0 {
            sink.warn("Invalid enlarge factor; using 2.0.");
            self.detector.enlarge_factor = 2.0;
        }
        if self.cache_expiry_hours <= 0 {
            sink.warn("Cache expiry must be positive; using 8 hours.");
            self.cache_expiry_hours = 8;
        }
        self
    }

    /// Writes the current values as pretty JSON, for reference.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemorySink};
    use tempfile::tempdir;

    #[test]
    fn test_default_scales() {
        let scales = DetectorConfig::default().scales();
        assert_eq!(scales.len(), 13);
        assert_eq!(scales[0], 0.7);
        assert_eq!(scales[3], 1.0);
        assert_eq!(*scales.last().unwrap(), 1.9);
    }

    #[test]
    fn test_lookback_is_longest_interval() {
        let config = AttendanceConfig::default();
        assert_eq!(config.lookback_days(), 28);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let sink = MemorySink::new();
        let config = AttendanceConfig::load(&dir.path().join("config.json"), &sink);
        assert_eq!(config.intervals, vec![7, 14, 28]);
        assert!(sink.contains(LogLevel::Info, "not found"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"intervals": [3, 30], "ocr": {"fuzzy_threshold": 80}}"#).unwrap();

        let sink = MemorySink::new();
        let config = AttendanceConfig::load(&path, &sink);

        assert_eq!(config.intervals, vec![3, 30]);
        assert_eq!(config.ocr.fuzzy_threshold, 80);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.max_cache_versions, 1);
        assert_eq!(config.lookback_days(), 30);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let sink = MemorySink::new();
        let config = AttendanceConfig::load(&path, &sink);

        assert_eq!(config.cache_expiry_hours, 8);
        assert!(sink.contains(LogLevel::Warn, "Failed to parse"));
    }

    #[test]
    fn test_validated_repairs_intervals() {
        let sink = MemorySink::new();
        let config = AttendanceConfig {
            intervals: vec![0],
            ..AttendanceConfig::default()
        }
        .validated(&sink);
        assert_eq!(config.intervals, vec![7, 14, 28]);
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let sink = MemorySink::new();

        let mut config = AttendanceConfig::default();
        config.force_recompute = true;
        config.save(&path).unwrap();

        let loaded = AttendanceConfig::load(&path, &sink);
        assert!(loaded.force_recompute);
    }
}
