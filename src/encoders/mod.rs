//! Output encoders for PNG, JPEG, WebP and AVIF
//!
//! Each encoder honours [`EncodeOptions`] and embeds the source ICC profile
//! unless metadata stripping is requested:
//!
//! - **PNG**: best compression with adaptive filtering, profile in `iCCP`
//! - **JPEG**: `jpeg-encoder` with optimized Huffman tables, optional
//!   progressive scan, profile in APP2 segments
//! - **WebP**: lossy `libwebp` encode at method 6, profile in a RIFF `ICCP` chunk
//! - **AVIF**: `image`'s rav1e-backed encoder at speed 6

pub mod avif_encoder;
pub mod jpeg_encoder;
pub mod png_encoder;
pub mod webp_encoder;

use crate::{
    config::{EncodeOptions, OutputFormat},
    error::{BgReplaceError, Result},
    services::OutputFormatHandler,
};
use image::DynamicImage;
use tracing::instrument;

/// Encode `image` as `format` into an in-memory buffer
///
/// # Errors
/// - Format disabled in this build
/// - Encoder failures (dimension limits, unsupported layouts)
#[instrument(skip_all, fields(format = %format, quality = options.quality))]
pub fn encode_image(
    image: &DynamicImage,
    format: OutputFormat,
    options: &EncodeOptions,
    icc_profile: Option<&[u8]>,
) -> Result<Vec<u8>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(BgReplaceError::processing("Cannot encode an empty image"));
    }

    let icc_profile = if options.strip_metadata {
        if icc_profile.is_some() {
            log::debug!("Stripping ICC profile from output");
        }
        None
    } else {
        icc_profile
    };

    let prepared = OutputFormatHandler::prepare_for_format(image, format);
    match format {
        OutputFormat::Png => png_encoder::encode(&prepared, icc_profile),
        OutputFormat::Jpeg => jpeg_encoder::encode(&prepared, options, icc_profile),
        OutputFormat::WebP => webp_encoder::encode(&prepared, options, icc_profile),
        OutputFormat::Avif => avif_encoder::encode(&prepared, options, icc_profile),
    }
}
