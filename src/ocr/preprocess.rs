use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use std::fmt;

/// Mild sharpening kernel for thin in-game fonts (unnormalized, sum 1.7).
const SHARPEN_KERNEL: [[f32; 3]; 3] = [[0.0, -0.2, 0.0], [-0.2, 2.5, -0.2], [0.0, -0.2, 0.0]];

/// Tiles per axis for adaptive equalization.
const CLAHE_GRID: u32 = 16;
const CLAHE_CLIP_LIMIT: f32 = 2.0;

/// One filtered rendering of a name crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    /// Grayscale with a 10% contrast stretch
    Contrast,
    /// Stronger stretch followed by unsharp masking
    ContrastSharpen,
    /// Custom 3x3 sharpening kernel
    KernelSharpen,
    /// Contrast-limited adaptive histogram equalization
    Adaptive,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Contrast,
        Variant::ContrastSharpen,
        Variant::KernelSharpen,
        Variant::Adaptive,
    ];

    /// Short label recorded in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Variant::Contrast => "v1",
            Variant::ContrastSharpen => "v2",
            Variant::KernelSharpen => "v3",
            Variant::Adaptive => "v4",
        }
    }

    pub fn apply(&self, crop: &RgbaImage) -> GrayImage {
        let gray = imageops::grayscale(crop);
        match self {
            Variant::Contrast => autocontrast(&gray, 10.0),
            Variant::ContrastSharpen => unsharp_mask(&autocontrast(&gray, 15.0), 1.0, 1.5, 3),
            Variant::KernelSharpen => convolve3x3(&gray, &SHARPEN_KERNEL),
            Variant::Adaptive => clahe(&gray, CLAHE_GRID, CLAHE_CLIP_LIMIT),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Renders every variant of `crop`, in [`Variant::ALL`] order.
pub fn preprocess_all(crop: &RgbaImage) -> Vec<(Variant, GrayImage)> {
    Variant::ALL.iter().map(|v| (*v, v.apply(crop))).collect()
}

/// Scales an image by `factor` with Lanczos resampling.
pub fn enlarge(img: &RgbaImage, factor: f32) -> RgbaImage {
    if (factor - 1.0).abs() < f32::EPSILON {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let nw = ((w as f32) * factor).max(1.0) as u32;
    let nh = ((h as f32) * factor).max(1.0) as u32;
    imageops::resize(img, nw, nh, FilterType::Lanczos3)
}

/// Stretches the histogram after discarding `cutoff_percent` of pixels at
/// each end.
pub fn autocontrast(img: &GrayImage, cutoff_percent: f32) -> GrayImage {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return img.clone();
    }

    let cut = (total as f64 * cutoff_percent as f64 / 100.0) as u64;
    let low = histogram_bound(&histogram, cut, (0..256).collect());
    let high = histogram_bound(&histogram, cut, (0..256).rev().collect());
    if high <= low {
        return img.clone();
    }

    let scale = 255.0 / (high - low) as f32;
    let mut output = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let v = (pixel[0] as f32 - low as f32) * scale;
        output.put_pixel(x, y, Luma([v.round().clamp(0.0, 255.0) as u8]));
    }
    output
}

/// First intensity, scanning `order`, once `cut` pixels have been skipped.
fn histogram_bound(histogram: &[u64; 256], cut: u64, order: Vec<usize>) -> usize {
    let mut remaining = cut;
    for i in order.iter().copied() {
        if histogram[i] > remaining {
            return i;
        }
        remaining -= histogram[i];
    }
    order.last().copied().unwrap_or(0)
}

/// `out = in + amount * (in - blur(in))` where the difference exceeds `threshold`.
pub fn unsharp_mask(img: &GrayImage, sigma: f32, amount: f32, threshold: u8) -> GrayImage {
    let blurred = imageops::blur(img, sigma);
    let mut output = img.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let original = img.get_pixel(x, y)[0] as f32;
        let diff = original - blurred.get_pixel(x, y)[0] as f32;
        if diff.abs() >= threshold as f32 {
            pixel[0] = (original + amount * diff).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Applies an unnormalized 3x3 kernel with edge pixels replicated.
pub fn convolve3x3(img: &GrayImage, kernel: &[[f32; 3]; 3]) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut output = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return output;
    }

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (ky, row) in kernel.iter().enumerate() {
                for (kx, k) in row.iter().enumerate() {
                    let sx = (x as i64 + kx as i64 - 1).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + ky as i64 - 1).clamp(0, h as i64 - 1) as u32;
                    acc += k * img.get_pixel(sx, sy)[0] as f32;
                }
            }
            output.put_pixel(x, y, Luma([acc.round().clamp(0.0, 255.0) as u8]));
        }
    }
    output
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into at most `grid`×`grid` tiles; each tile gets a
/// clipped, redistributed histogram and its own lookup table, and pixels
/// blend the four nearest tables bilinearly.
pub fn clahe(img: &GrayImage, grid: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let tiles_x = grid.clamp(1, w);
    let tiles_y = grid.clamp(1, h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = (tx * tile_w).min(w - 1);
            let y0 = (ty * tile_h).min(h - 1);
            let x1 = ((tx + 1) * tile_w).min(w);
            let y1 = ((ty + 1) * tile_h).min(h);
            luts.push(tile_lut(img, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let mut output = GrayImage::new(w, h);

    for y in 0..h {
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = fy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = (fy - ty0 as f32).clamp(0.0, 1.0);

        for x in 0..w {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = fx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = (fx - tx0 as f32).clamp(0.0, 1.0);

            let v = img.get_pixel(x, y)[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty0)[v] as f32 * wx;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - wx) + lut_at(tx1, ty1)[v] as f32 * wx;
            let blended = top * (1.0 - wy) + bottom * wy;
            output.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    output
}

fn tile_lut(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[img.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = ((x1 - x0) * (y1 - y0)).max(1);

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let residual = excess % 256;
    for bin in histogram.iter_mut() {
        *bin += bonus;
    }
    if residual > 0 {
        let step = (256 / residual as usize).max(1);
        for bin in histogram.iter_mut().step_by(step).take(residual as usize) {
            *bin += 1;
        }
    }

    let mut lut = [0u8; 256];
    let scale = 255.0 / area as f32;
    let mut cumulative = 0;
    for (i, bin) in histogram.iter().enumerate() {
        cumulative += bin;
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32, lo: u8, hi: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| {
            let t = x as f32 / (w - 1).max(1) as f32;
            Luma([(lo as f32 + t * (hi - lo) as f32).round() as u8])
        })
    }

    fn name_crop() -> RgbaImage {
        RgbaImage::from_fn(40, 12, |x, y| {
            if (4..8).contains(&y) && x % 5 < 3 {
                Rgba([210, 200, 180, 255])
            } else {
                Rgba([50, 45, 60, 255])
            }
        })
    }

    #[test]
    fn test_autocontrast_stretches_narrow_range() {
        let img = gradient(101, 1, 100, 150);
        let out = autocontrast(&img, 0.0);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(100, 0)[0], 255);
    }

    #[test]
    fn test_autocontrast_flat_image_unchanged() {
        let img = GrayImage::from_pixel(5, 5, Luma([77]));
        assert_eq!(autocontrast(&img, 10.0), img);
    }

    #[test]
    fn test_identity_kernel_is_noop() {
        let img = gradient(9, 4, 0, 200);
        let identity = [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(convolve3x3(&img, &identity), img);
    }

    #[test]
    fn test_sharpen_kernel_brightens_flat_regions() {
        // Unnormalized kernel sums to 1.7, so a flat field gets brighter.
        let img = GrayImage::from_pixel(4, 4, Luma([100]));
        let out = convolve3x3(&img, &SHARPEN_KERNEL);
        assert_eq!(out.get_pixel(1, 1)[0], 170);
    }

    #[test]
    fn test_clahe_single_tile_is_monotone_and_spread() {
        let img = gradient(64, 1, 0, 255);
        let out = clahe(&img, 1, 2.0);

        let values: Vec<u8> = out.pixels().map(|p| p[0]).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values[63] - values[0] > 200);
    }

    #[test]
    fn test_clahe_boosts_local_contrast() {
        let mut img = GrayImage::from_pixel(32, 32, Luma([100]));
        for y in 12..20 {
            for x in 12..20 {
                img.put_pixel(x, y, Luma([110]));
            }
        }

        let out = clahe(&img, 1, 2.0);

        let background = out.get_pixel(0, 0)[0];
        let patch = out.get_pixel(15, 15)[0];
        assert!(patch > background);
        assert!(patch - background > 10);
    }

    #[test]
    fn test_clahe_on_tiny_image() {
        let img = gradient(3, 2, 0, 255);
        assert_eq!(clahe(&img, 16, 2.0).dimensions(), (3, 2));
    }

    #[test]
    fn test_preprocess_all_is_deterministic() {
        let crop = name_crop();
        let first = preprocess_all(&crop);
        let second = preprocess_all(&crop);

        let labels: Vec<&str> = first.iter().map(|(v, _)| v.label()).collect();
        assert_eq!(labels, vec!["v1", "v2", "v3", "v4"]);
        for ((_, a), (_, b)) in first.iter().zip(second.iter()) {
            assert_eq!(a, b);
            assert_eq!(a.dimensions(), (40, 12));
        }
    }

    #[test]
    fn test_enlarge_doubles_size() {
        let crop = name_crop();
        assert_eq!(enlarge(&crop, 2.0).dimensions(), (80, 24));
        assert_eq!(enlarge(&crop, 1.0), crop);
    }
}
