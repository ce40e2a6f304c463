//! JPEG encoding through `jpeg-encoder`
//!
//! `jpeg-encoder` supports progressive scans, optimized Huffman tables and
//! multi-segment APP2 ICC embedding, none of which the `image` crate's JPEG
//! encoder exposes.

use crate::{
    config::EncodeOptions,
    error::{BgReplaceError, Result},
};
use image::{ColorType, DynamicImage};
use jpeg_encoder::{ColorType as JpegColorType, Encoder};

/// Encode an `L8` or `Rgb8` image
///
/// # Errors
/// - Dimensions above 65535
/// - Unsupported pixel layout
/// - Encoder failures
pub fn encode(image: &DynamicImage, options: &EncodeOptions, icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    let width = u16::try_from(image.width()).map_err(|_| {
        BgReplaceError::processing(format!("JPEG width {} exceeds 65535", image.width()))
    })?;
    let height = u16::try_from(image.height()).map_err(|_| {
        BgReplaceError::processing(format!("JPEG height {} exceeds 65535", image.height()))
    })?;

    let color_type = match image.color() {
        ColorType::L8 => JpegColorType::Luma,
        ColorType::Rgb8 => JpegColorType::Rgb,
        other => {
            return Err(BgReplaceError::unsupported_format(format!(
                "JPEG cannot store {other:?} pixels"
            )))
        },
    };

    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, options.quality);
    encoder.set_progressive(options.progressive);
    encoder.set_optimized_huffman_tables(true);

    if let Some(icc) = icc_profile {
        encoder
            .add_icc_profile(icc)
            .map_err(|e| BgReplaceError::processing(format!("Failed to embed ICC profile: {e}")))?;
        log::debug!("Embedding {} byte ICC profile in JPEG", icc.len());
    }

    encoder
        .encode(image.as_bytes(), width, height, color_type)
        .map_err(|e| BgReplaceError::processing(format!("Failed to encode JPEG: {e}")))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 50])))
    }

    /// SOF2 marks a progressive frame, SOF0 a baseline one
    fn has_marker(data: &[u8], marker: u8) -> bool {
        data.windows(2).any(|w| w == [0xFF, marker])
    }

    #[test]
    fn test_baseline_and_progressive() {
        let baseline = encode(&sample(), &EncodeOptions::default(), None).unwrap();
        assert_eq!(&baseline[..2], &[0xFF, 0xD8]);
        assert!(has_marker(&baseline, 0xC0));

        let progressive = encode(
            &sample(),
            &EncodeOptions {
                progressive: true,
                ..EncodeOptions::default()
            },
            None,
        )
        .unwrap();
        assert!(has_marker(&progressive, 0xC2));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let high = encode(&sample(), &EncodeOptions::default(), None).unwrap();
        let low = encode(
            &sample(),
            &EncodeOptions {
                quality: 10,
                ..EncodeOptions::default()
            },
            None,
        )
        .unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_rejects_alpha_layout() {
        let rgba = DynamicImage::new_rgba8(4, 4);
        assert!(encode(&rgba, &EncodeOptions::default(), None).is_err());
    }
}
