//! PNG encoding at maximum compression

use crate::error::{BgReplaceError, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageEncoder};

/// Encode with best compression and adaptive filtering, embedding `icc_profile` as `iCCP`
///
/// # Errors
/// - Encoder failures from the `image` crate
pub fn encode(image: &DynamicImage, icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);

    if let Some(icc) = icc_profile {
        match encoder.set_icc_profile(icc.to_vec()) {
            Ok(()) => log::debug!("Embedding {} byte ICC profile in PNG", icc.len()),
            Err(e) => log::warn!("PNG encoder rejected ICC profile: {e}"),
        }
    }

    encoder
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )
        .map_err(|e| BgReplaceError::processing(format!("Failed to encode PNG: {e}")))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_png_signature_and_iccp_chunk() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([200])));
        let bytes = encode(&image, Some(&[1u8; 128])).unwrap();

        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        assert!(bytes.windows(4).any(|w| w == b"iCCP"));

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_luma8().get_pixel(1, 1).0, [200]);
    }

    #[test]
    fn test_png_without_profile() {
        let image = DynamicImage::new_rgb8(3, 3);
        let bytes = encode(&image, None).unwrap();
        assert!(!bytes.windows(4).any(|w| w == b"iCCP"));
    }
}
