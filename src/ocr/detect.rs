//! Anchor-based name region detection.
//!
//! Every player row in the guild screen carries the same small UI element
//! (the anchor) a fixed distance to the right of the name. Finding the
//! anchors at several template scales gives the name labels without any
//! layout calibration.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use std::path::Path;

use super::preprocess::enlarge;
use super::template::match_template;
use crate::config::DetectorConfig;
use crate::logging::SharedSink;

/// An anchor found at one template scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorMatch {
    pub x: u32,
    pub y: u32,
    pub scale: f32,
}

/// Crop rectangle in enlarged-screenshot pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A cropped name label and where it came from.
#[derive(Clone, Debug)]
pub struct NameRegion {
    pub rect: RegionRect,
    pub anchor: AnchorMatch,
    pub image: RgbaImage,
}

/// Locates name labels by matching the anchor template.
pub struct AnchorDetector {
    template: GrayImage,
    config: DetectorConfig,
    scales: Vec<f32>,
    sink: SharedSink,
}

impl AnchorDetector {
    /// Builds a detector from an anchor template already in memory.
    ///
    /// The template is enlarged by the same factor as every screenshot.
    pub fn new(template: &RgbaImage, config: DetectorConfig, sink: SharedSink) -> Self {
        let enlarged = enlarge(template, config.enlarge_factor);
        let scales = config.scales();
        Self {
            template: imageops::grayscale(&enlarged),
            config,
            scales,
            sink,
        }
    }

    /// Loads the anchor template from disk.
    pub fn from_file(path: &Path, config: DetectorConfig, sink: SharedSink) -> Result<Self> {
        let template = image::open(path)
            .with_context(|| format!("Failed to load anchor template {}", path.display()))?
            .to_rgba8();
        Ok(Self::new(&template, config, sink))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Enlarges `screenshot` and returns the name crops in reading order.
    ///
    /// Returns an empty list when no anchor matches.
    pub fn detect(&self, screenshot: &RgbaImage) -> Vec<NameRegion> {
        let enlarged = enlarge(screenshot, self.config.enlarge_factor);
        self.detect_enlarged(&enlarged)
    }

    /// Same as [`detect`](Self::detect) for a screenshot that is already enlarged.
    pub fn detect_enlarged(&self, enlarged: &RgbaImage) -> Vec<NameRegion> {
        let gray = imageops::grayscale(enlarged);
        let matches = self.find_anchors(&gray);
        if matches.is_empty() {
            self.sink.warn("No area matched with anchor template.");
            return Vec::new();
        }

        let mut accepted: Vec<RegionRect> = Vec::new();
        let mut regions = Vec::new();
        let (img_w, img_h) = enlarged.dimensions();

        for row in group_rows(matches, self.config.row_tolerance) {
            for anchor in row {
                let Some(rect) = self.region_for(&anchor, img_w, img_h) else {
                    continue;
                };
                let tol = self.config.region_tolerance;
                let duplicate = accepted
                    .iter()
                    .any(|prev| prev.x.abs_diff(rect.x) <= tol && prev.y.abs_diff(rect.y) <= tol);
                if duplicate {
                    continue;
                }
                accepted.push(rect);
                let image = imageops::crop_imm(enlarged, rect.x, rect.y, rect.width, rect.height).to_image();
                regions.push(NameRegion {
                    rect,
                    anchor,
                    image,
                });
            }
        }

        self.sink
            .debug(&format!("Detected {} name region(s).", regions.len()));
        regions
    }

    /// Runs the template at every scale and merges hits of the same anchor.
    pub fn find_anchors(&self, gray: &GrayImage) -> Vec<AnchorMatch> {
        let (tw, th) = self.template.dimensions();
        let mut points = Vec::new();

        for &scale in &self.scales {
            let resized;
            let template = if (scale - 1.0).abs() < f32::EPSILON {
                &self.template
            } else {
                let w = ((tw as f32) * scale).round().max(1.0) as u32;
                let h = ((th as f32) * scale).round().max(1.0) as u32;
                resized = imageops::resize(&self.template, w, h, FilterType::Triangle);
                &resized
            };

            let hits = match_template(gray, template, self.config.match_threshold);
            points.extend(hits.into_iter().map(|h| AnchorMatch {
                x: h.x,
                y: h.y,
                scale,
            }));
        }

        merge_matches(points, self.config.merge_tolerance)
    }

    /// Name rectangle for `anchor`, clamped to the image; `None` if empty.
    fn region_for(&self, anchor: &AnchorMatch, img_w: u32, img_h: u32) -> Option<RegionRect> {
        let offset = self.config.name_offset;
        let size = self.config.name_size;
        let scale = anchor.scale;

        let left = (anchor.x as f32 + offset.x as f32 * scale).max(0.0) as u32;
        let top = (anchor.y as f32 + offset.y as f32 * scale).max(0.0) as u32;
        if left >= img_w || top >= img_h {
            return None;
        }
        let width = ((size.width as f32 * scale) as u32).min(img_w - left);
        let height = ((size.height as f32 * scale) as u32).min(img_h - top);
        if width == 0 || height == 0 {
            return None;
        }

        Some(RegionRect {
            x: left,
            y: top,
            width,
            height,
        })
    }
}

/// Clusters points within `tolerance` on both axes of a cluster's first
/// member; each cluster is represented by its middle element by x.
pub fn merge_matches(points: Vec<AnchorMatch>, tolerance: u32) -> Vec<AnchorMatch> {
    let mut clusters: Vec<Vec<AnchorMatch>> = Vec::new();

    for point in points {
        let home = clusters.iter_mut().find(|cluster| {
            let first = cluster[0];
            first.x.abs_diff(point.x) <= tolerance && first.y.abs_diff(point.y) <= tolerance
        });
        match home {
            Some(cluster) => cluster.push(point),
            None => clusters.push(vec![point]),
        }
    }

    clusters
        .into_iter()
        .map(|mut cluster| {
            cluster.sort_by_key(|p| p.x);
            cluster[cluster.len() / 2]
        })
        .collect()
}

/// Groups points into rows by vertical proximity, each row sorted by x.
pub fn group_rows(mut points: Vec<AnchorMatch>, row_tolerance: u32) -> Vec<Vec<AnchorMatch>> {
    points.sort_by_key(|p| p.y);

    let mut rows: Vec<Vec<AnchorMatch>> = Vec::new();
    for point in points {
        match rows.last_mut() {
            Some(row) if row.last().is_some_and(|last| last.y.abs_diff(point.y) <= row_tolerance) => {
                row.push(point)
            }
            _ => rows.push(vec![point]),
        }
    }

    for row in &mut rows {
        row.sort_by_key(|p| p.x);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PixelOffset, PixelSize};
    use crate::logging::{LogLevel, MemorySink};
    use image::Rgba;
    use std::sync::Arc;

    fn at(x: u32, y: u32, scale: f32) -> AnchorMatch {
        AnchorMatch { x, y, scale }
    }

    /// Small high-contrast "minus button" anchor.
    fn anchor_template() -> RgbaImage {
        RgbaImage::from_fn(10, 10, |x, y| {
            if (3..7).contains(&y) && (1..9).contains(&x) {
                Rgba([250, 250, 250, 255])
            } else if x == 0 || y == 0 || x == 9 || y == 9 {
                Rgba([120, 90, 40, 255])
            } else {
                Rgba([30, 30, 30, 255])
            }
        })
    }

    fn test_config() -> DetectorConfig {
        DetectorConfig {
            enlarge_factor: 1.0,
            scale_min: 1.0,
            scale_max: 1.0,
            scale_step: 0.1,
            match_threshold: 0.9,
            merge_tolerance: 4,
            row_tolerance: 3,
            region_tolerance: 5,
            name_offset: PixelOffset { x: -30, y: 0 },
            name_size: PixelSize {
                width: 28,
                height: 10,
            },
        }
    }

    fn screenshot(anchors: &[(u32, u32)]) -> RgbaImage {
        let template = anchor_template();
        let mut img = RgbaImage::from_pixel(160, 90, Rgba([60, 60, 70, 255]));
        for &(x, y) in anchors {
            imageops::replace(&mut img, &template, x as i64, y as i64);
        }
        img
    }

    #[test]
    fn test_merge_keeps_middle_by_x() {
        let merged = merge_matches(vec![at(12, 5, 0.9), at(10, 5, 0.8), at(14, 6, 1.0)], 10);
        assert_eq!(merged, vec![at(12, 5, 0.9)]);
    }

    #[test]
    fn test_merge_separates_distant_points() {
        let merged = merge_matches(vec![at(0, 0, 1.0), at(50, 0, 1.0), at(3, 2, 1.1)], 10);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1], at(50, 0, 1.0));
    }

    #[test]
    fn test_group_rows_orders_top_down_left_right() {
        let rows = group_rows(vec![at(90, 41, 1.0), at(10, 40, 1.0), at(50, 2, 1.0), at(5, 0, 1.0)], 3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![at(5, 0, 1.0), at(50, 2, 1.0)]);
        assert_eq!(rows[1], vec![at(10, 40, 1.0), at(90, 41, 1.0)]);
    }

    #[test]
    fn test_detect_crops_left_of_each_anchor() {
        let sink = Arc::new(MemorySink::new());
        let detector = AnchorDetector::new(&anchor_template(), test_config(), sink);
        let img = screenshot(&[(60, 10), (140, 10), (60, 50)]);

        let regions = detector.detect(&img);

        let rects: Vec<RegionRect> = regions.iter().map(|r| r.rect).collect();
        assert_eq!(
            rects,
            vec![
                RegionRect { x: 30, y: 10, width: 28, height: 10 },
                RegionRect { x: 110, y: 10, width: 28, height: 10 },
                RegionRect { x: 30, y: 50, width: 28, height: 10 },
            ]
        );
        assert_eq!(regions[0].image.dimensions(), (28, 10));
    }

    #[test]
    fn test_detect_clamps_at_left_edge() {
        let sink = Arc::new(MemorySink::new());
        let detector = AnchorDetector::new(&anchor_template(), test_config(), sink);
        let img = screenshot(&[(12, 30)]);

        let regions = detector.detect(&img);

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect.x, 0);
        assert_eq!(regions[0].rect.width, 28);
    }

    #[test]
    fn test_nearby_regions_are_dropped() {
        let detector = AnchorDetector::new(
            &anchor_template(),
            DetectorConfig {
                merge_tolerance: 0,
                region_tolerance: 20,
                ..test_config()
            },
            Arc::new(MemorySink::new()),
        );
        let img = screenshot(&[(60, 10), (72, 12)]);

        assert_eq!(detector.detect(&img).len(), 1);
    }

    #[test]
    fn test_no_anchor_returns_empty_and_warns() {
        let sink = Arc::new(MemorySink::new());
        let detector = AnchorDetector::new(&anchor_template(), test_config(), sink.clone());
        let img = RgbaImage::from_pixel(100, 60, Rgba([60, 60, 70, 255]));

        assert!(detector.detect(&img).is_empty());
        assert!(sink.contains(LogLevel::Warn, "No area matched"));
    }

    #[test]
    fn test_missing_template_file_is_an_error() {
        let result = AnchorDetector::from_file(
            Path::new("/definitely/not/here.png"),
            test_config(),
            Arc::new(MemorySink::new()),
        );
        assert!(result.is_err());
    }
}
