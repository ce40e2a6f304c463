//! Pixel layout conversion ahead of encoding

use crate::config::OutputFormat;
use image::{ColorType, DynamicImage};

/// Service for converting images into the layout each encoder accepts
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert `image` to an 8-bit layout `format` can store
    ///
    /// JPEG drops alpha (greyscale stays greyscale); WebP and AVIF get RGB or
    /// RGBA; PNG keeps any 8-bit layout and narrows everything else.
    #[must_use]
    pub fn prepare_for_format(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
        let color = image.color();
        let is_luma = matches!(
            color,
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
        );

        match format {
            OutputFormat::Jpeg if is_luma => ensure(image, ColorType::L8),
            OutputFormat::Jpeg => ensure(image, ColorType::Rgb8),
            OutputFormat::Png => match color {
                ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => image.clone(),
                ColorType::L16 => DynamicImage::ImageLuma8(image.to_luma8()),
                ColorType::La16 => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
                _ if color.has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()),
            },
            OutputFormat::WebP | OutputFormat::Avif => {
                if color.has_alpha() {
                    ensure(image, ColorType::Rgba8)
                } else {
                    ensure(image, ColorType::Rgb8)
                }
            },
        }
    }

    /// Whether saving `image` as `format` silently loses transparency
    #[must_use]
    pub fn drops_alpha(image: &DynamicImage, format: OutputFormat) -> bool {
        image.color().has_alpha() && !format.supports_transparency()
    }
}

fn ensure(image: &DynamicImage, target: ColorType) -> DynamicImage {
    if image.color() == target {
        return image.clone();
    }
    match target {
        ColorType::L8 => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorType::Rgba8 => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgba, RgbaImage};

    #[test]
    fn test_jpeg_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 40])));
        let prepared = OutputFormatHandler::prepare_for_format(&rgba, OutputFormat::Jpeg);
        assert_eq!(prepared.color(), ColorType::Rgb8);
        assert_eq!(prepared.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
        assert!(OutputFormatHandler::drops_alpha(&rgba, OutputFormat::Jpeg));
        assert!(!OutputFormatHandler::drops_alpha(&rgba, OutputFormat::Png));
    }

    #[test]
    fn test_masks_stay_greyscale() {
        let mask = DynamicImage::ImageLuma8(GrayImage::new(3, 3));
        assert_eq!(
            OutputFormatHandler::prepare_for_format(&mask, OutputFormat::Jpeg).color(),
            ColorType::L8
        );
        assert_eq!(
            OutputFormatHandler::prepare_for_format(&mask, OutputFormat::Png).color(),
            ColorType::L8
        );
        assert_eq!(
            OutputFormatHandler::prepare_for_format(&mask, OutputFormat::WebP).color(),
            ColorType::Rgb8
        );
    }

    #[test]
    fn test_webp_and_avif_keep_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        for format in [OutputFormat::WebP, OutputFormat::Avif, OutputFormat::Png] {
            assert_eq!(
                OutputFormatHandler::prepare_for_format(&rgba, format).color(),
                ColorType::Rgba8
            );
        }
    }

    #[test]
    fn test_png_narrows_sixteen_bit() {
        let wide = DynamicImage::new_rgba16(2, 2);
        assert_eq!(
            OutputFormatHandler::prepare_for_format(&wide, OutputFormat::Png).color(),
            ColorType::Rgba8
        );
    }
}
