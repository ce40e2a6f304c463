//! AVIF encoding through the `image` crate

use crate::{
    config::EncodeOptions,
    error::{BgReplaceError, Result},
};
use image::DynamicImage;

/// rav1e speed preset: 1 is slowest, 10 fastest
pub const AVIF_SPEED: u8 = 6;

/// Encode an `Rgb8` or `Rgba8` image as AVIF
///
/// # Errors
/// - Encoder failures
#[cfg(feature = "avif-support")]
pub fn encode(image: &DynamicImage, options: &EncodeOptions, icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    use image::codecs::avif::AvifEncoder;
    use image::ImageEncoder;

    let mut buffer = Vec::new();
    let mut encoder = AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, options.quality);
    if let Some(icc) = icc_profile {
        if let Err(e) = encoder.set_icc_profile(icc.to_vec()) {
            log::debug!("AVIF encoder does not embed ICC profiles: {e}");
        }
    }

    encoder
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )
        .map_err(|e| BgReplaceError::processing(format!("Failed to encode AVIF: {e}")))?;

    Ok(buffer)
}

#[cfg(not(feature = "avif-support"))]
pub fn encode(_image: &DynamicImage, _options: &EncodeOptions, _icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    Err(BgReplaceError::unsupported_format(
        "AVIF output is not enabled in this build",
    ))
}

#[cfg(all(test, feature = "avif-support"))]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_avif_container_brand() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([10, 120, 240, 128])));
        let bytes = encode(&image, &EncodeOptions::default(), None).unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
        assert!(bytes.windows(4).any(|w| w == b"avif"));
    }
}
