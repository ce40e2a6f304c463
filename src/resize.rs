//! Output resizing

use crate::error::{BgReplaceError, Result};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};

/// Requested output size
///
/// Priority: `scale`, then `width` + `height`, then a single dimension.
/// An empty spec leaves the image alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Uniform factor, e.g. 0.5 for half size
    pub scale: Option<f32>,
    /// With both dimensions set: fit inside the box (shrink only) instead of stretching
    pub maintain_aspect: bool,
}

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            scale: None,
            maintain_aspect: true,
        }
    }
}

impl ResizeSpec {
    /// Uniform scale factor
    #[must_use]
    pub fn scale(factor: f32) -> Self {
        Self {
            scale: Some(factor),
            ..Self::default()
        }
    }

    /// Fixed width, height follows the aspect ratio
    #[must_use]
    pub fn width(width: u32) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    /// Fixed height, width follows the aspect ratio
    #[must_use]
    pub fn height(height: u32) -> Self {
        Self {
            height: Some(height),
            ..Self::default()
        }
    }

    /// Bounding box; `maintain_aspect = false` stretches to the exact size
    #[must_use]
    pub fn fit(width: u32, height: u32, maintain_aspect: bool) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            scale: None,
            maintain_aspect,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.scale.is_none()
    }

    /// # Errors
    /// - Scale that is not a positive finite number
    /// - Zero width or height
    pub fn validate(&self) -> Result<()> {
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(BgReplaceError::config_value_error("scale", scale, "> 0.0", None));
            }
        }
        if self.width == Some(0) {
            return Err(BgReplaceError::config_value_error("width", 0, ">= 1", None));
        }
        if self.height == Some(0) {
            return Err(BgReplaceError::config_value_error("height", 0, ">= 1", None));
        }
        Ok(())
    }

    /// Output dimensions for a `width` x `height` source, `None` when no resize applies
    #[must_use]
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (f64::from(width), f64::from(height));

        if let Some(scale) = self.scale {
            let scale = f64::from(scale);
            return Some((scaled(w, scale), scaled(h, scale)));
        }

        match (self.width, self.height) {
            (Some(box_w), Some(box_h)) if self.maintain_aspect => {
                let ratio = (f64::from(box_w) / w).min(f64::from(box_h) / h);
                if ratio >= 1.0 {
                    // Already inside the box
                    return None;
                }
                Some((scaled(w, ratio), scaled(h, ratio)))
            },
            (Some(box_w), Some(box_h)) => Some((box_w, box_h)),
            (Some(new_w), None) => Some((new_w, scaled(h, f64::from(new_w) / w))),
            (None, Some(new_h)) => Some((scaled(w, f64::from(new_h) / h), new_h)),
            (None, None) => None,
        }
    }

    /// Resize with Lanczos3; returns the input unchanged when nothing applies
    #[must_use]
    pub fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self.target_dimensions(image.width(), image.height()) {
            Some((w, h)) if (w, h) != (image.width(), image.height()) => {
                log::info!(
                    "Resizing: {}x{} -> {}x{}",
                    image.width(),
                    image.height(),
                    w,
                    h
                );
                image.resize_exact(w, h, FilterType::Lanczos3)
            },
            _ => image,
        }
    }
}

fn scaled(value: f64, factor: f64) -> u32 {
    (value * factor).round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_spec_is_noop() {
        let spec = ResizeSpec::default();
        assert!(spec.is_empty());
        assert_eq!(spec.target_dimensions(800, 600), None);
    }

    #[test]
    fn test_scale() {
        assert_eq!(ResizeSpec::scale(0.5).target_dimensions(801, 600), Some((401, 300)));
        assert_eq!(ResizeSpec::scale(1.0).target_dimensions(123, 45), Some((123, 45)));
        assert_eq!(ResizeSpec::scale(0.001).target_dimensions(100, 100), Some((1, 1)));
    }

    #[test]
    fn test_scale_wins_over_dimensions() {
        let spec = ResizeSpec {
            width: Some(10),
            height: Some(10),
            scale: Some(2.0),
            maintain_aspect: false,
        };
        assert_eq!(spec.target_dimensions(50, 40), Some((100, 80)));
    }

    #[test]
    fn test_fit_keeps_aspect_and_only_shrinks() {
        let spec = ResizeSpec::fit(1000, 1000, true);
        assert_eq!(spec.target_dimensions(4000, 2000), Some((1000, 500)));
        assert_eq!(spec.target_dimensions(800, 600), None);
    }

    #[test]
    fn test_exact_stretch() {
        let spec = ResizeSpec::fit(300, 300, false);
        assert_eq!(spec.target_dimensions(4000, 2000), Some((300, 300)));
        assert_eq!(spec.target_dimensions(10, 20), Some((300, 300)));
    }

    #[test]
    fn test_single_dimension_follows_ratio() {
        assert_eq!(ResizeSpec::width(640).target_dimensions(1920, 1080), Some((640, 360)));
        assert_eq!(ResizeSpec::height(100).target_dimensions(300, 200), Some((150, 100)));
        assert_eq!(ResizeSpec::width(1).target_dimensions(1000, 10), Some((1, 1)));
    }

    #[test]
    fn test_validate() {
        assert!(ResizeSpec::scale(0.0).validate().is_err());
        assert!(ResizeSpec::scale(-2.0).validate().is_err());
        assert!(ResizeSpec::scale(f32::INFINITY).validate().is_err());
        assert!(ResizeSpec::width(0).validate().is_err());
        assert!(ResizeSpec::height(0).validate().is_err());
        assert!(ResizeSpec::fit(10, 20, false).validate().is_ok());
    }

    #[test]
    fn test_apply_resizes_pixels() {
        let image = DynamicImage::new_rgba8(64, 32);
        let resized = ResizeSpec::width(16).apply(image);
        assert_eq!((resized.width(), resized.height()), (16, 8));
    }
}
