pub mod detect;
pub mod engine;
pub mod matcher;
pub mod preprocess;
pub mod setup;
pub mod template;

pub use detect::{AnchorDetector, AnchorMatch, NameRegion, RegionRect};
pub use engine::{TesseractRecognizer, TextRecognizer};
pub use matcher::{RosterMatch, RosterMatcher};
pub use preprocess::{preprocess_all, Variant};

use crate::logging::LogSink;

/// Recognizes every variant of one name crop and returns the accepted
/// roster names in variant order.
///
/// Recognizer failures and empty output are logged and skipped.
pub fn recognize_region(
    region: &NameRegion,
    recognizer: &dyn TextRecognizer,
    matcher: &RosterMatcher,
    sink: &dyn LogSink,
) -> Vec<(String, Variant)> {
    let mut found = Vec::new();

    for (variant, img) in preprocess_all(&region.image) {
        let text = match recognizer.recognize_line(&img) {
            Ok(text) => text,
            Err(e) => {
                sink.warn(&format!("OCR {} at ({}, {}): {}", variant, region.rect.x, region.rect.y, e));
                continue;
            }
        };
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        match matcher.match_text(text) {
            Ok(m) => {
                sink.debug(&format!("OCR {} read \"{}\" -> {} ({})", variant, text, m.name, m.score));
                found.push((m.name, variant));
            }
            Err(e) => sink.debug(&e.to_string()),
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AttendanceError, Result};
    use crate::logging::{LogLevel, MemorySink};
    use image::{GrayImage, Rgba, RgbaImage};
    use std::cell::RefCell;

    /// Replays one reading per call; `None` fails the call.
    struct Replay(RefCell<Vec<Option<&'static str>>>);

    impl TextRecognizer for Replay {
        fn recognize_line(&self, _img: &GrayImage) -> Result<String> {
            match self.0.borrow_mut().remove(0) {
                Some(text) => Ok(text.to_string()),
                None => Err(AttendanceError::Recognizer("engine crashed".to_string())),
            }
        }
    }

    fn region() -> NameRegion {
        NameRegion {
            rect: RegionRect {
                x: 4,
                y: 8,
                width: 20,
                height: 6,
            },
            anchor: AnchorMatch {
                x: 30,
                y: 8,
                scale: 1.0,
            },
            image: RgbaImage::from_pixel(20, 6, Rgba([200, 200, 200, 255])),
        }
    }

    #[test]
    fn test_region_skips_blank_unmatched_and_failed_reads() {
        let recognizer = Replay(RefCell::new(vec![Some("  "), Some("zzzzzz"), None, Some(" B0b ")]));
        let matcher = RosterMatcher::new(["Alice", "Bob"], 60);
        let sink = MemorySink::new();

        let found = recognize_region(&region(), &recognizer, &matcher, &sink);

        assert_eq!(found, vec![("Bob".to_string(), Variant::Adaptive)]);
        assert!(sink.contains(LogLevel::Warn, "engine crashed"));
    }
}
