//! Brightness, contrast, sharpness and edge feathering
//!
//! Each factor blends the image with a degenerate version of itself:
//! `out = degenerate + factor * (image - degenerate)`. A factor of 1.0 is the
//! identity, 0.0 yields the degenerate image and values above 1.0 extrapolate.

use crate::{config::Enhancements, filters::truncate_channel};
use image::{imageops, DynamicImage, GrayImage, RgbImage, RgbaImage};

/// Apply every non-identity enhancement in a fixed order:
/// brightness, contrast, sharpness, then feathering
#[must_use]
pub fn apply_enhancements(image: &DynamicImage, enhancements: &Enhancements) -> DynamicImage {
    if enhancements.is_identity() {
        return image.clone();
    }

    let mut working = WorkingImage::from_dynamic(image);

    if is_active(enhancements.brightness) {
        log::info!("Adjusting brightness: {}", enhancements.brightness);
        working.brightness(enhancements.brightness);
    }
    if is_active(enhancements.contrast) {
        log::info!("Adjusting contrast: {}", enhancements.contrast);
        working.contrast(enhancements.contrast);
    }
    if is_active(enhancements.sharpness) {
        log::info!("Adjusting sharpness: {}", enhancements.sharpness);
        working.sharpness(enhancements.sharpness);
    }
    if enhancements.feather > 0 {
        working.feather(enhancements.feather);
    }

    working.into_dynamic()
}

/// Scale brightness; 0.0 is black
#[must_use]
pub fn adjust_brightness(image: &DynamicImage, factor: f32) -> DynamicImage {
    let mut working = WorkingImage::from_dynamic(image);
    working.brightness(factor);
    working.into_dynamic()
}

/// Scale contrast around the mean luminance; 0.0 is flat grey
#[must_use]
pub fn adjust_contrast(image: &DynamicImage, factor: f32) -> DynamicImage {
    let mut working = WorkingImage::from_dynamic(image);
    working.contrast(factor);
    working.into_dynamic()
}

/// Blend with a smoothed copy; 0.0 is blurred, above 1.0 sharpens
#[must_use]
pub fn adjust_sharpness(image: &DynamicImage, factor: f32) -> DynamicImage {
    let mut working = WorkingImage::from_dynamic(image);
    working.sharpness(factor);
    working.into_dynamic()
}

/// Gaussian blur of the alpha channel only
///
/// Images without alpha are returned unchanged.
#[must_use]
pub fn feather_alpha(image: &DynamicImage, radius: u32) -> DynamicImage {
    let mut working = WorkingImage::from_dynamic(image);
    working.feather(radius);
    working.into_dynamic()
}

#[allow(clippy::float_cmp)]
fn is_active(factor: f32) -> bool {
    factor != 1.0
}

/// Interleaved 8-bit RGB or RGBA pixels
struct WorkingImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
    has_alpha: bool,
}

impl WorkingImage {
    fn from_dynamic(image: &DynamicImage) -> Self {
        let has_alpha = image.color().has_alpha();
        let data = if has_alpha {
            image.to_rgba8().into_raw()
        } else {
            image.to_rgb8().into_raw()
        };
        Self {
            width: image.width(),
            height: image.height(),
            data,
            has_alpha,
        }
    }

    fn into_dynamic(self) -> DynamicImage {
        // Buffer length always matches width * height * stride
        if self.has_alpha {
            RgbaImage::from_raw(self.width, self.height, self.data)
                .map_or_else(|| DynamicImage::new_rgba8(0, 0), DynamicImage::ImageRgba8)
        } else {
            RgbImage::from_raw(self.width, self.height, self.data)
                .map_or_else(|| DynamicImage::new_rgb8(0, 0), DynamicImage::ImageRgb8)
        }
    }

    fn stride(&self) -> usize {
        if self.has_alpha {
            4
        } else {
            3
        }
    }

    fn color_channels_mut(&mut self) -> impl Iterator<Item = &mut u8> {
        let stride = self.stride();
        self.data
            .chunks_exact_mut(stride)
            .flat_map(|pixel| pixel.iter_mut().take(3))
    }

    fn brightness(&mut self, factor: f32) {
        for channel in self.color_channels_mut() {
            *channel = truncate_channel(factor * f32::from(*channel));
        }
    }

    fn contrast(&mut self, factor: f32) {
        let mean = f32::from(self.mean_luma());
        for channel in self.color_channels_mut() {
            *channel = truncate_channel(mean + factor * (f32::from(*channel) - mean));
        }
    }

    /// Rounded mean of the per-pixel luma
    fn mean_luma(&self) -> u8 {
        let pixels = self.data.chunks_exact(self.stride());
        let count = pixels.len();
        if count == 0 {
            return 0;
        }
        let total: u64 = pixels
            .map(|p| match p {
                [r, g, b, ..] => u64::from(crate::filters::luma(*r, *g, *b)),
                _ => 0,
            })
            .sum();
        (total as f64 / count as f64 + 0.5) as u8
    }

    fn sharpness(&mut self, factor: f32) {
        let smoothed = self.smoothed();
        let stride = self.stride();
        for (pixel, smooth) in self
            .data
            .chunks_exact_mut(stride)
            .zip(smoothed.chunks_exact(stride))
        {
            for (channel, degenerate) in pixel.iter_mut().zip(smooth).take(3) {
                let base = f32::from(*degenerate);
                *channel = truncate_channel(base + factor * (f32::from(*channel) - base));
            }
        }
    }

    /// 3x3 smoothing kernel `[1 1 1; 1 5 1; 1 1 1] / 13`; border pixels keep their values
    fn smoothed(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let (width, height) = (self.width as usize, self.height as usize);
        if width < 3 || height < 3 {
            return out;
        }

        let stride = self.stride();
        let row = width * stride;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                for c in 0..3 {
                    let mut sum = 0u32;
                    for dy in 0..3 {
                        for dx in 0..3 {
                            let idx = (y + dy - 1) * row + (x + dx - 1) * stride + c;
                            let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                            sum += weight * u32::from(self.data.get(idx).copied().unwrap_or(0));
                        }
                    }
                    if let Some(slot) = out.get_mut(y * row + x * stride + c) {
                        *slot = ((sum as f32 / 13.0) + 0.5).min(255.0) as u8;
                    }
                }
            }
        }
        out
    }

    fn feather(&mut self, radius: u32) {
        if !self.has_alpha || radius == 0 {
            return;
        }
        log::info!("Feathering edges: {radius}px");

        let alpha: Vec<u8> = self.data.chunks_exact(4).map(|p| p.get(3).copied().unwrap_or(255)).collect();
        let Some(alpha) = GrayImage::from_raw(self.width, self.height, alpha) else {
            return;
        };
        let blurred = imageops::blur(&alpha, radius as f32);
        for (pixel, value) in self.data.chunks_exact_mut(4).zip(blurred.into_raw()) {
            if let Some(slot) = pixel.get_mut(3) {
                *slot = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    fn gradient_rgba(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbaImage::new(width, height);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = Rgba([(x * 20) as u8, (y * 20) as u8, 120, (x * 10 + 50) as u8]);
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_identity_enhancements_return_same_image() {
        let input = gradient_rgba(6, 5);
        let output = apply_enhancements(&input, &Enhancements::default());
        assert_eq!(input, output);
    }

    #[test]
    fn test_zero_brightness_is_black_with_alpha_kept() {
        let input = gradient_rgba(5, 5);
        let output = adjust_brightness(&input, 0.0).to_rgba8();
        for (orig, out) in input.to_rgba8().pixels().zip(output.pixels()) {
            assert_eq!(out.0, [0, 0, 0, orig.0[3]]);
        }
    }

    #[test]
    fn test_brightness_doubles_and_clamps() {
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([50, 100, 200])));
        let output = adjust_brightness(&input, 2.0);
        assert!(matches!(output, DynamicImage::ImageRgb8(_)));
        assert_eq!(output.to_rgb8().get_pixel(1, 1).0, [100, 200, 255]);
    }

    #[test]
    fn test_zero_contrast_is_flat_mean_grey() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let output = adjust_contrast(&DynamicImage::ImageRgb8(img), 0.0).to_rgb8();
        // mean luma 127.5 rounds to 128
        assert_eq!(output.get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(output.get_pixel(1, 0).0, [128, 128, 128]);
    }

    #[test]
    fn test_sharpness_keeps_flat_image_and_border() {
        let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([90, 90, 90])));
        assert_eq!(adjust_sharpness(&flat, 2.0), flat);

        let input = gradient_rgba(5, 5);
        let output = adjust_sharpness(&input, 0.0).to_rgba8();
        let original = input.to_rgba8();
        assert_eq!(output.get_pixel(0, 0), original.get_pixel(0, 0));
        assert_eq!(output.get_pixel(4, 2), original.get_pixel(4, 2));
    }

    #[test]
    fn test_zero_sharpness_smooths_a_spike() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]));
        img.put_pixel(1, 1, Rgb([130, 130, 130]));
        let output = adjust_sharpness(&DynamicImage::ImageRgb8(img), 0.0).to_rgb8();
        // 130 * 5 / 13 = 50
        assert_eq!(output.get_pixel(1, 1).0, [50, 50, 50]);
    }

    #[test]
    fn test_feather_only_touches_alpha() {
        let mut img = RgbaImage::from_pixel(41, 41, Rgba([10, 20, 30, 0]));
        for y in 10..31 {
            for x in 10..31 {
                img.put_pixel(x, y, Rgba([10, 20, 30, 255]));
            }
        }
        let output = feather_alpha(&DynamicImage::ImageRgba8(img), 2).to_rgba8();

        assert!(output.pixels().all(|p| p.0[..3] == [10, 20, 30]));
        let edge = output.get_pixel(10, 20).0[3];
        assert!(edge > 0 && edge < 255, "edge alpha should be soft, got {edge}");
        assert!(output.get_pixel(20, 20).0[3] >= 250);
        assert!(output.get_pixel(0, 0).0[3] <= 5);
    }

    #[test]
    fn test_feather_without_alpha_is_noop() {
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));
        assert_eq!(feather_alpha(&input, 4), input);
    }
}
