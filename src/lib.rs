//! Guild attendance engine.
//!
//! Turns guild-screen screenshots, in-game roster exports and killboard
//! statistics into per-player attendance over trailing 7/14/28-day windows.

pub mod attendance;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod roster;

pub use attendance::{AttendancePipeline, EvidenceRecord, EvidenceSource, IntervalBuckets};
pub use config::AttendanceConfig;
pub use error::AttendanceError;
