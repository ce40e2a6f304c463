//! Alpha matting for soft subject edges
//!
//! The segmentation mask is split into a trimap. Alpha inside the uncertain
//! band is re-estimated with a guided filter steered by image luminance, and
//! foreground colors are recovered with two rounds of Blur-Fusion so the old
//! background does not bleed into translucent pixels.
//!
//! All neighborhood means use summed-area tables, so cost is independent of
//! the window radius.

use crate::error::{BgReplaceError, Result};
use crate::filters::luma;
use image::{DynamicImage, GrayImage, RgbaImage};
use tracing::instrument;

/// Mask values above this are certain foreground
pub const FOREGROUND_THRESHOLD: u8 = 240;
/// Mask values below this are certain background
pub const BACKGROUND_THRESHOLD: u8 = 10;
/// Side of the square eroding both certain regions
pub const ERODE_SIZE: u32 = 10;

const GUIDED_RADIUS: u32 = 8;
const GUIDED_EPS: f32 = 1e-4;
const BLUR_FUSION_RADII: [u32; 2] = [90, 6];
const WEIGHT_EPS: f32 = 1e-5;

/// Trimap classification of a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimapRegion {
    Background,
    Unknown,
    Foreground,
}

/// Single-channel f32 plane
#[derive(Debug, Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_fn(width: usize, height: usize, f: impl Fn(usize) -> f32) -> Self {
        Self {
            width,
            height,
            data: (0..width * height).map(f).collect(),
        }
    }

    fn map2(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::from_fn(self.width, self.height, |i| f(self.data[i], other.data[i]))
    }

    fn map3(&self, b: &Self, c: &Self, f: impl Fn(f32, f32, f32) -> f32) -> Self {
        Self::from_fn(self.width, self.height, |i| f(self.data[i], b.data[i], c.data[i]))
    }

    /// Mean over the (2r+1)² window clipped to the image
    fn box_mean(&self, radius: u32) -> Self {
        let r = radius as usize;
        self.window_mean(r, r)
    }

    /// Mean over the window spanning `before` pixels up/left and `after`
    /// pixels down/right of each pixel, clipped to the image
    fn window_mean(&self, before: usize, after: usize) -> Self {
        let (w, h) = (self.width, self.height);
        let stride = w + 1;
        let mut integral = vec![0f64; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0f64;
            for x in 0..w {
                row_sum += f64::from(self.data[y * w + x]);
                integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
            }
        }

        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            let (y0, y1) = (y.saturating_sub(before), (y + after + 1).min(h));
            for x in 0..w {
                let (x0, x1) = (x.saturating_sub(before), (x + after + 1).min(w));
                let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0]
                    + integral[y0 * stride + x0];
                let count = ((y1 - y0) * (x1 - x0)) as f64;
                data.push((sum / count) as f32);
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }
}

/// Classify every mask pixel; certain regions are eroded with an
/// `erode`×`erode` square
///
/// The square is anchored at `erode / 2`, so an even size reaches one pixel
/// further up and left than down and right. Pixels beyond the image edge
/// count as belonging to the region being eroded.
#[must_use]
pub fn trimap(mask: &GrayImage, erode: u32) -> Vec<TrimapRegion> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let raw = mask.as_raw();
    let fg = Plane::from_fn(w, h, |i| f32::from(u8::from(raw[i] > FOREGROUND_THRESHOLD)));
    let bg = Plane::from_fn(w, h, |i| f32::from(u8::from(raw[i] < BACKGROUND_THRESHOLD)));

    let (fg, bg) = if erode > 1 {
        let before = erode as usize / 2;
        let after = erode as usize - 1 - before;
        (fg.window_mean(before, after), bg.window_mean(before, after))
    } else {
        (fg, bg)
    };

    // A window mean of 1.0 means every neighbor was in the region
    fg.data
        .iter()
        .zip(&bg.data)
        .map(|(&f, &b)| {
            if f >= 1.0 - 1e-6 {
                TrimapRegion::Foreground
            } else if b >= 1.0 - 1e-6 {
                TrimapRegion::Background
            } else {
                TrimapRegion::Unknown
            }
        })
        .collect()
}

/// Edge-preserving smoothing of `input` following the structure of `guide`
fn guided_filter(guide: &Plane, input: &Plane, radius: u32, eps: f32) -> Plane {
    let mean_i = guide.box_mean(radius);
    let mean_p = input.box_mean(radius);
    let corr_ip = guide.map2(input, |i, p| i * p).box_mean(radius);
    let corr_ii = guide.map2(guide, |a, b| a * b).box_mean(radius);

    let var_i = corr_ii.map2(&mean_i, |ii, m| ii - m * m);
    let cov_ip = corr_ip.map3(&mean_i, &mean_p, |ip, mi, mp| ip - mi * mp);

    let a = cov_ip.map2(&var_i, |cov, var| cov / (var + eps));
    let b = mean_p.map3(&a, &mean_i, |mp, a, mi| mp - a * mi);

    let mean_a = a.box_mean(radius);
    let mean_b = b.box_mean(radius);
    mean_a.map3(&mean_b, guide, |a, b, i| (a * i + b).clamp(0.0, 1.0))
}

/// One Blur-Fusion pass over a single channel; returns (foreground, blurred background)
fn blur_fusion_pass(image: &Plane, fg: &Plane, bg: &Plane, alpha: &Plane, radius: u32) -> (Plane, Plane) {
    let blurred_alpha = alpha.box_mean(radius);
    let blurred_fa = fg.map2(alpha, |f, a| f * a).box_mean(radius);
    let blurred_f = blurred_fa.map2(&blurred_alpha, |fa, a| fa / (a + WEIGHT_EPS));
    let blurred_b1a = bg.map2(alpha, |b, a| b * (1.0 - a)).box_mean(radius);
    let blurred_b = blurred_b1a.map2(&blurred_alpha, |b1a, a| b1a / ((1.0 - a) + WEIGHT_EPS));

    let estimate = Plane::from_fn(image.width, image.height, |i| {
        let (a, f, b) = (alpha.data[i], blurred_f.data[i], blurred_b.data[i]);
        (f + a * (image.data[i] - a * f - (1.0 - a) * b)).clamp(0.0, 1.0)
    });
    (estimate, blurred_b)
}

/// Estimate the uncontaminated foreground color of one channel
fn estimate_foreground(image: &Plane, alpha: &Plane) -> Plane {
    let [first, second] = BLUR_FUSION_RADII;
    let (fg, bg) = blur_fusion_pass(image, image, image, alpha, first / 2);
    blur_fusion_pass(image, &fg, &bg, alpha, second / 2).0
}

/// Refine `mask` against `image` and return the matted cutout
///
/// # Errors
/// - Mask and image dimensions differ
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn alpha_matting_cutout(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
    let (width, height) = (image.width(), image.height());
    if mask.dimensions() != (width, height) {
        return Err(BgReplaceError::processing_stage_error(
            "alpha_matting",
            &format!(
                "mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                width,
                height
            ),
            None,
        ));
    }

    let rgb = image.to_rgb8();
    let (w, h) = (width as usize, height as usize);
    let raw = rgb.as_raw();
    let regions = trimap(mask, ERODE_SIZE);

    let unknown = regions.iter().filter(|r| **r == TrimapRegion::Unknown).count();
    log::debug!("Alpha matting: {unknown} of {} pixels in the unknown band", w * h);

    let guide = Plane::from_fn(w, h, |i| {
        f32::from(luma(raw[i * 3], raw[i * 3 + 1], raw[i * 3 + 2])) / 255.0
    });
    let coarse = Plane::from_fn(w, h, |i| f32::from(mask.as_raw()[i]) / 255.0);
    let refined = guided_filter(&guide, &coarse, GUIDED_RADIUS, GUIDED_EPS);

    let alpha = Plane::from_fn(w, h, |i| match regions[i] {
        TrimapRegion::Foreground => 1.0,
        TrimapRegion::Background => 0.0,
        TrimapRegion::Unknown => refined.data[i],
    });

    let channels: Vec<Plane> = (0..3)
        .map(|c| {
            let plane = Plane::from_fn(w, h, |i| f32::from(raw[i * 3 + c]) / 255.0);
            estimate_foreground(&plane, &alpha)
        })
        .collect();

    let mut cutout = RgbaImage::new(width, height);
    for (i, pixel) in cutout.pixels_mut().enumerate() {
        let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        let a = alpha.data[i];
        // Colors are scaled by alpha like the naive cutout
        pixel.0 = [
            to_u8(channels[0].data[i] * a),
            to_u8(channels[1].data[i] * a),
            to_u8(channels[2].data[i] * a),
            to_u8(a),
        ];
    }
    Ok(cutout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn disc_mask(size: u32, radius: f32) -> GrayImage {
        let c = size as f32 / 2.0;
        GrayImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 + 0.5 - c).powi(2) + (y as f32 + 0.5 - c).powi(2)).sqrt();
            Luma([if d < radius { 255 } else { 0 }])
        })
    }

    #[test]
    fn test_box_mean_constant_plane() {
        let plane = Plane::from_fn(7, 5, |_| 3.0);
        let mean = plane.box_mean(2);
        assert!(mean.data.iter().all(|v| (v - 3.0).abs() < 1e-5));
    }

    #[test]
    fn test_box_mean_clips_window_at_edges() {
        let plane = Plane::from_fn(3, 1, |i| i as f32);
        let mean = plane.box_mean(1);
        assert!((mean.data[0] - 0.5).abs() < 1e-6);
        assert!((mean.data[1] - 1.0).abs() < 1e-6);
        assert!((mean.data[2] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_trimap_regions() {
        let mask = disc_mask(60, 20.0);
        let regions = trimap(&mask, 3);
        let at = |x: usize, y: usize| regions[y * 60 + x];

        assert_eq!(at(30, 30), TrimapRegion::Foreground);
        assert_eq!(at(0, 0), TrimapRegion::Background);
        // Right on the disc boundary both regions have been eroded away
        assert_eq!(at(50, 30), TrimapRegion::Unknown);
        assert_eq!(at(49, 30), TrimapRegion::Unknown);
    }

    #[test]
    fn test_trimap_erosion_uses_square_of_given_size() {
        // Foreground on columns 0..20 of a single row
        let mask = GrayImage::from_fn(40, 1, |x, _| Luma([if x < 20 { 255 } else { 0 }]));
        let regions = trimap(&mask, ERODE_SIZE);

        // 10 wide square anchored at 5: reaches 4 right and 5 left
        assert_eq!(regions[15], TrimapRegion::Foreground);
        assert_eq!(regions[16], TrimapRegion::Unknown);
        assert_eq!(regions[24], TrimapRegion::Unknown);
        assert_eq!(regions[25], TrimapRegion::Background);
        let unknown = regions.iter().filter(|r| **r == TrimapRegion::Unknown).count();
        assert_eq!(unknown, 9);
    }

    #[test]
    fn test_trimap_mid_values_are_unknown() {
        let mask = GrayImage::from_pixel(4, 4, Luma([128]));
        assert!(trimap(&mask, 0).iter().all(|r| *r == TrimapRegion::Unknown));
    }

    #[test]
    fn test_cutout_keeps_certain_regions() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(60, 60, |x, _| {
            if x < 30 { Rgb([200, 40, 40]) } else { Rgb([40, 40, 200]) }
        }));
        let mask = disc_mask(60, 20.0);
        let cutout = alpha_matting_cutout(&image, &mask).unwrap();

        assert_eq!(cutout.dimensions(), (60, 60));
        assert_eq!(cutout.get_pixel(30, 30).0[3], 255);
        assert_eq!(cutout.get_pixel(1, 1).0[3], 0);
        let center = cutout.get_pixel(25, 30).0;
        assert!(center[0] > 150 && center[2] < 100);
    }

    #[test]
    fn test_cutout_rejects_mismatched_mask() {
        let image = DynamicImage::new_rgb8(10, 10);
        assert!(alpha_matting_cutout(&image, &GrayImage::new(5, 5)).is_err());
    }

    #[test]
    fn test_guided_filter_flat_guide_smooths_input() {
        let guide = Plane::from_fn(9, 9, |_| 0.5);
        let input = Plane::from_fn(9, 9, |i| if i % 9 < 4 { 1.0 } else { 0.0 });
        let out = guided_filter(&guide, &input, 2, 1e-4);
        assert!(out.data.iter().all(|v| (0.0..=1.0).contains(v)));
        // Flat guide degenerates to a double box blur, so the step softens
        assert!(out.data[4] > 0.0 && out.data[4] < 1.0);
    }
}
