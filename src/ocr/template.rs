//! Normalized cross-correlation template matching on grayscale images.
//!
//! Scores follow the zero-mean normalized form: for a template T and an
//! image window W of the same size,
//!
//! `score = Σ (T - mean(T)) * (W - mean(W)) / sqrt(Σ (T - mean(T))² * Σ (W - mean(W))²)`
//!
//! which lies in -1.0..=1.0. Window sums come from integral images so each
//! position costs one pass over the template.
//!
//! Large images are searched coarse-to-fine: a downsampled pass with a
//! relaxed threshold proposes positions, and only their neighbourhoods are
//! scored at full resolution.

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::collections::HashSet;

/// Smallest template side kept after downsampling for the coarse pass.
const MIN_COARSE_TEMPLATE_SIDE: u32 = 8;

/// Largest downsampling factor for the coarse pass.
const MAX_PYRAMID_FACTOR: u32 = 4;

/// How far below the final threshold the coarse pass still proposes.
const COARSE_THRESHOLD_SLACK: f32 = 0.15;

/// Windows flatter than this variance never match.
const MIN_WINDOW_VARIANCE: f64 = 1e-6;

/// One position whose score reached the threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateHit {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Summed-area tables of pixel values and squared values.
struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl IntegralImage {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let stride = w as usize + 1;
        let mut sum = vec![0.0; stride * (h as usize + 1)];
        let mut sq_sum = vec![0.0; stride * (h as usize + 1)];

        for y in 0..h as usize {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w as usize {
                let v = img.get_pixel(x as u32, y as u32)[0] as f64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    /// Returns (Σv, Σv²) over the `w`×`h` window at (x, y).
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |t: &Vec<f64>, xx: usize, yy: usize| t[yy * self.stride + xx];
        let s = at(&self.sum, x1, y1) - at(&self.sum, x0, y1) - at(&self.sum, x1, y0)
            + at(&self.sum, x0, y0);
        let sq = at(&self.sq_sum, x1, y1) - at(&self.sq_sum, x0, y1) - at(&self.sq_sum, x1, y0)
            + at(&self.sq_sum, x0, y0);
        (s, sq)
    }
}

/// Zero-mean template values plus their energy.
struct PreparedTemplate {
    width: u32,
    height: u32,
    centered: Vec<f64>,
    energy: f64,
}

impl PreparedTemplate {
    fn new(template: &GrayImage) -> Option<Self> {
        let (width, height) = template.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let n = (width * height) as f64;
        let mean = template.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let centered: Vec<f64> = template.pixels().map(|p| p[0] as f64 - mean).collect();
        let energy: f64 = centered.iter().map(|v| v * v).sum();
        if energy <= f64::EPSILON {
            return None;
        }
        Some(Self {
            width,
            height,
            centered,
            energy,
        })
    }

    fn score_at(&self, img: &GrayImage, integral: &IntegralImage, x: u32, y: u32) -> f32 {
        let n = (self.width * self.height) as f64;
        let (s, sq) = integral.window(x, y, self.width, self.height);
        let variance = sq - s * s / n;
        if variance <= MIN_WINDOW_VARIANCE {
            return 0.0;
        }

        let mut cross = 0.0;
        let mut i = 0;
        for ty in 0..self.height {
            for tx in 0..self.width {
                cross += self.centered[i] * img.get_pixel(x + tx, y + ty)[0] as f64;
                i += 1;
            }
        }

        (cross / (self.energy * variance).sqrt()) as f32
    }
}

/// Scores every position exhaustively and returns those at or above
/// `threshold`, in row-major order.
pub fn match_template_exhaustive(img: &GrayImage, template: &GrayImage, threshold: f32) -> Vec<TemplateHit> {
    let Some(prepared) = PreparedTemplate::new(template) else {
        return Vec::new();
    };
    let (iw, ih) = img.dimensions();
    if prepared.width > iw || prepared.height > ih {
        return Vec::new();
    }

    let integral = IntegralImage::new(img);
    let mut hits = Vec::new();
    for y in 0..=(ih - prepared.height) {
        for x in 0..=(iw - prepared.width) {
            let score = prepared.score_at(img, &integral, x, y);
            if score >= threshold {
                hits.push(TemplateHit { x, y, score });
            }
        }
    }
    hits
}

/// Finds positions scoring at or above `threshold`, searching coarse-to-fine
/// when the template is large enough to survive downsampling.
pub fn match_template(img: &GrayImage, template: &GrayImage, threshold: f32) -> Vec<TemplateHit> {
    let (tw, th) = template.dimensions();
    let factor = (tw.min(th) / MIN_COARSE_TEMPLATE_SIDE).clamp(1, MAX_PYRAMID_FACTOR);
    if factor == 1 {
        return match_template_exhaustive(img, template, threshold);
    }

    let (iw, ih) = img.dimensions();
    if tw > iw || th > ih {
        return Vec::new();
    }
    let Some(prepared) = PreparedTemplate::new(template) else {
        return Vec::new();
    };

    let small_img = imageops::resize(img, (iw / factor).max(1), (ih / factor).max(1), FilterType::Triangle);
    let small_template = imageops::resize(template, (tw / factor).max(1), (th / factor).max(1), FilterType::Triangle);
    let coarse = match_template_exhaustive(&small_img, &small_template, threshold - COARSE_THRESHOLD_SLACK);
    if coarse.is_empty() {
        return Vec::new();
    }

    let integral = IntegralImage::new(img);
    let max_x = iw - tw;
    let max_y = ih - th;
    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let mut hits = Vec::new();

    for candidate in coarse {
        let cx = candidate.x * factor;
        let cy = candidate.y * factor;
        let y_range = cy.saturating_sub(factor)..=(cy + factor).min(max_y);
        for y in y_range {
            let x_range = cx.saturating_sub(factor)..=(cx + factor).min(max_x);
            for x in x_range {
                if !seen.insert((x, y)) {
                    continue;
                }
                let score = prepared.score_at(img, &integral, x, y);
                if score >= threshold {
                    hits.push(TemplateHit { x, y, score });
                }
            }
        }
    }

    hits.sort_by_key(|h| (h.y, h.x));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Cross-shaped pattern with enough structure to correlate.
    fn pattern(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let mid = size / 2;
            if x.abs_diff(mid) <= size / 6 || y.abs_diff(mid) <= size / 6 {
                Luma([230])
            } else if (x + y) % 2 == 0 {
                Luma([40])
            } else {
                Luma([70])
            }
        })
    }

    fn scene_with(template: &GrayImage, positions: &[(u32, u32)], w: u32, h: u32) -> GrayImage {
        let mut scene = GrayImage::from_pixel(w, h, Luma([20]));
        for &(px, py) in positions {
            imageops::replace(&mut scene, template, px as i64, py as i64);
        }
        scene
    }

    #[test]
    fn test_exact_copy_scores_one() {
        let template = pattern(12);
        let scene = scene_with(&template, &[(30, 17)], 80, 50);

        let hits = match_template_exhaustive(&scene, &template, 0.99);

        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].x, hits[0].y), (30, 17));
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_brightness_shift_does_not_change_score() {
        let template = pattern(12);
        let mut scene = scene_with(&template, &[(5, 5)], 40, 40);
        for p in scene.pixels_mut() {
            p[0] = p[0].saturating_add(10);
        }

        let hits = match_template_exhaustive(&scene, &template, 0.99);
        assert!(hits.iter().any(|h| h.x == 5 && h.y == 5));
    }

    #[test]
    fn test_flat_template_never_matches() {
        let template = GrayImage::from_pixel(8, 8, Luma([128]));
        let scene = GrayImage::from_pixel(40, 40, Luma([128]));
        assert!(match_template(&scene, &template, 0.5).is_empty());
    }

    #[test]
    fn test_template_larger_than_image() {
        let template = pattern(50);
        let scene = GrayImage::new(20, 20);
        assert!(match_template(&scene, &template, 0.5).is_empty());
    }

    #[test]
    fn test_coarse_to_fine_finds_every_copy() {
        let template = pattern(32);
        let positions = [(8, 12), (120, 12), (64, 88)];
        let scene = scene_with(&template, &positions, 200, 140);

        let hits = match_template(&scene, &template, 0.95);

        for (px, py) in positions {
            assert!(
                hits.iter().any(|h| h.x == px && h.y == py),
                "missing hit at ({}, {})",
                px,
                py
            );
        }
        assert!(hits.iter().all(|h| h.score >= 0.95));
    }
}
