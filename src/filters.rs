//! Color filter presets and saturation adjustment

use crate::error::{BgReplaceError, Result};
use image::{DynamicImage, Pixel, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Color grading presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFilter {
    /// Boost reds and yellows, pull back blue
    Warm,
    /// Boost blue, pull back red
    Cool,
    Sepia,
    /// Lifted, faded film tones
    Vintage,
    Vibrant,
    /// Desaturated toward the pixel mean
    Muted,
}

impl ColorFilter {
    pub const ALL: [ColorFilter; 6] = [
        Self::Warm,
        Self::Cool,
        Self::Sepia,
        Self::Vintage,
        Self::Vibrant,
        Self::Muted,
    ];

    fn transform(self, [r, g, b]: [f32; 3]) -> [f32; 3] {
        match self {
            Self::Warm => [r * 1.15, g * 1.08, b * 0.85],
            Self::Cool => [r * 0.85, g * 0.95, b * 1.15],
            Self::Sepia => [
                r * 0.393 + g * 0.769 + b * 0.189,
                r * 0.349 + g * 0.686 + b * 0.168,
                r * 0.272 + g * 0.534 + b * 0.131,
            ],
            Self::Vintage => [r * 0.9 + 30.0, g * 0.85 + 20.0, b * 0.7 + 10.0],
            Self::Vibrant => [r * 1.12, g * 1.12, b * 1.12],
            Self::Muted => {
                let mean = (r + g + b) / 3.0;
                [
                    r * 0.7 + mean * 0.3,
                    g * 0.7 + mean * 0.3,
                    b * 0.7 + mean * 0.3,
                ]
            },
        }
    }
}

impl std::fmt::Display for ColorFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Warm => "warm",
            Self::Cool => "cool",
            Self::Sepia => "sepia",
            Self::Vintage => "vintage",
            Self::Vibrant => "vibrant",
            Self::Muted => "muted",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ColorFilter {
    type Err = BgReplaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warm" => Ok(Self::Warm),
            "cool" | "cold" => Ok(Self::Cool),
            "sepia" => Ok(Self::Sepia),
            "vintage" => Ok(Self::Vintage),
            "vibrant" => Ok(Self::Vibrant),
            "muted" => Ok(Self::Muted),
            other => Err(BgReplaceError::invalid_config(format!(
                "Unknown filter '{other}' (expected one of: warm, cool, cold, sepia, vintage, vibrant, muted)"
            ))),
        }
    }
}

/// Apply a preset and then a saturation factor
///
/// With no preset and a saturation of exactly 1.0 the image is returned as-is.
/// Alpha is never modified. Images that are neither RGB nor RGBA are promoted
/// to RGBA when they carry alpha and to RGB otherwise.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn apply_color_filter(
    image: &DynamicImage,
    filter: Option<ColorFilter>,
    saturation: f32,
) -> DynamicImage {
    if filter.is_none() && saturation == 1.0 {
        return image.clone();
    }

    if let Some(filter) = filter {
        log::info!("Applying {filter} filter");
    }
    let adjust_saturation = saturation != 1.0;
    if adjust_saturation {
        log::info!("Adjusting saturation: {saturation}");
    }

    let grade = |rgb: &mut Rgb<u8>| {
        let mut channels = rgb.0;
        if let Some(filter) = filter {
            let graded = filter.transform(channels.map(f32::from));
            channels = graded.map(truncate_channel);
        }
        if adjust_saturation {
            channels = saturate(channels, saturation);
        }
        rgb.0 = channels;
    };

    if image.color().has_alpha() {
        let mut rgba: RgbaImage = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let mut rgb = pixel.to_rgb();
            grade(&mut rgb);
            pixel.0 = [rgb.0[0], rgb.0[1], rgb.0[2], pixel.0[3]];
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb: RgbImage = image.to_rgb8();
        for pixel in rgb.pixels_mut() {
            grade(pixel);
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

/// Rec. 601 luma in integer arithmetic, rounded
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let weighted = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
    (weighted >> 16) as u8
}

/// Blend with the pixel's grey level: `L + s*(C - L)`
fn saturate([r, g, b]: [u8; 3], factor: f32) -> [u8; 3] {
    let grey = f32::from(luma(r, g, b));
    [r, g, b].map(|c| truncate_channel(grey + factor * (f32::from(c) - grey)))
}

/// Clamp to [0, 255] and drop the fractional part
pub(crate) fn truncate_channel(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}
