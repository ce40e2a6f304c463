//! Lossy WebP encoding with ICC profile embedding
//!
//! `libwebp` does not write color profiles, so the profile is spliced into
//! the RIFF container afterwards: an `ICCP` chunk right after a `VP8X` header
//! whose ICC flag is set. Simple-format files get a `VP8X` header created.

use crate::{
    config::EncodeOptions,
    error::{BgReplaceError, Result},
};
use image::DynamicImage;

const VP8X_ICC_FLAG: u8 = 0x20;
const VP8X_ALPHA_FLAG: u8 = 0x10;

/// Encode an `Rgb8` or `Rgba8` image as lossy WebP
///
/// # Errors
/// - Unsupported pixel layout
/// - `libwebp` failures
/// - Malformed container while embedding the profile
#[cfg(feature = "webp-support")]
pub fn encode(image: &DynamicImage, options: &EncodeOptions, icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let encoder = match image {
        DynamicImage::ImageRgba8(rgba) => webp::Encoder::from_rgba(rgba.as_raw(), width, height),
        DynamicImage::ImageRgb8(rgb) => webp::Encoder::from_rgb(rgb.as_raw(), width, height),
        other => {
            return Err(BgReplaceError::unsupported_format(format!(
                "WebP cannot store {:?} pixels",
                other.color()
            )))
        },
    };

    let mut config = webp::WebPConfig::new()
        .map_err(|()| BgReplaceError::internal("Failed to initialize WebP encoder config"))?;
    config.lossless = 0;
    config.quality = f32::from(options.quality);
    config.method = 6;

    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|e| BgReplaceError::processing(format!("Failed to encode WebP: {e:?}")))?;
    let data = encoded.to_vec();

    match icc_profile {
        Some(icc) => {
            log::debug!("Embedding {} byte ICC profile in WebP", icc.len());
            insert_iccp_chunk(&data, icc, width, height)
        },
        None => Ok(data),
    }
}

#[cfg(not(feature = "webp-support"))]
pub fn encode(_image: &DynamicImage, _options: &EncodeOptions, _icc_profile: Option<&[u8]>) -> Result<Vec<u8>> {
    Err(BgReplaceError::unsupported_format(
        "WebP output is not enabled in this build",
    ))
}

/// One RIFF chunk borrowed from the source buffer
struct Chunk<'a> {
    fourcc: &'a [u8],
    payload: &'a [u8],
}

fn parse_chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>> {
    if data.len() < 12 || data.get(0..4) != Some(b"RIFF") || data.get(8..12) != Some(b"WEBP") {
        return Err(BgReplaceError::processing("Invalid WebP/RIFF signature"));
    }

    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let fourcc = &data[pos..pos + 4];
        let size_bytes: [u8; 4] = data[pos + 4..pos + 8]
            .try_into()
            .map_err(|_| BgReplaceError::processing("Truncated WebP chunk header"))?;
        let size = u32::from_le_bytes(size_bytes) as usize;
        let payload = data
            .get(pos + 8..pos + 8 + size)
            .ok_or_else(|| BgReplaceError::processing("Truncated WebP chunk payload"))?;
        chunks.push(Chunk { fourcc, payload });
        pos += 8 + size + (size % 2);
    }
    Ok(chunks)
}

fn push_chunk(out: &mut Vec<u8>, fourcc: &[u8], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 != 0 {
        out.push(0);
    }
}

fn vp8x_payload(flags: u8, width: u32, height: u32) -> Vec<u8> {
    let mut payload = vec![flags, 0, 0, 0];
    payload.extend_from_slice(&width.saturating_sub(1).to_le_bytes()[..3]);
    payload.extend_from_slice(&height.saturating_sub(1).to_le_bytes()[..3]);
    payload
}

/// Rebuild the container with `icc` embedded
///
/// # Errors
/// - Input is not a RIFF/WebP buffer
pub fn insert_iccp_chunk(data: &[u8], icc: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let chunks = parse_chunks(data)?;

    let mut out = Vec::with_capacity(data.len() + icc.len() + 32);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(b"WEBP");

    let has_alpha = chunks.iter().any(|c| c.fourcc == b"ALPH");
    let body = match chunks.first() {
        Some(first) if first.fourcc == b"VP8X" => {
            let mut header = first.payload.to_vec();
            if let Some(flags) = header.first_mut() {
                *flags |= VP8X_ICC_FLAG;
            }
            push_chunk(&mut out, b"VP8X", &header);
            &chunks[1..]
        },
        _ => {
            let mut flags = VP8X_ICC_FLAG;
            if has_alpha {
                flags |= VP8X_ALPHA_FLAG;
            }
            push_chunk(&mut out, b"VP8X", &vp8x_payload(flags, width, height));
            &chunks[..]
        },
    };

    push_chunk(&mut out, b"ICCP", icc);
    for chunk in body.iter().filter(|c| c.fourcc != b"ICCP") {
        push_chunk(&mut out, chunk.fourcc, chunk.payload);
    }

    let riff_size = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_webp() -> Vec<u8> {
        let mut data = b"RIFF\0\0\0\0WEBP".to_vec();
        push_chunk(&mut data, b"VP8 ", &[1, 2, 3]);
        let size = (data.len() - 8) as u32;
        data[4..8].copy_from_slice(&size.to_le_bytes());
        data
    }

    #[test]
    fn test_insert_iccp_into_simple_file() {
        let out = insert_iccp_chunk(&simple_webp(), &[9; 5], 10, 20).unwrap();
        let chunks = parse_chunks(&out).unwrap();
        let names: Vec<&[u8]> = chunks.iter().map(|c| c.fourcc).collect();
        assert_eq!(names, vec![&b"VP8X"[..], &b"ICCP"[..], &b"VP8 "[..]]);

        let vp8x = chunks[0].payload;
        assert_eq!(vp8x[0] & VP8X_ICC_FLAG, VP8X_ICC_FLAG);
        assert_eq!(&vp8x[4..7], &[9, 0, 0]);
        assert_eq!(&vp8x[7..10], &[19, 0, 0]);
        assert_eq!(chunks[1].payload, &[9; 5]);
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()) as usize, out.len() - 8);
    }

    #[test]
    fn test_insert_iccp_into_extended_file() {
        let mut data = b"RIFF\0\0\0\0WEBP".to_vec();
        push_chunk(&mut data, b"VP8X", &vp8x_payload(VP8X_ALPHA_FLAG, 4, 4));
        push_chunk(&mut data, b"ALPH", &[0; 4]);
        push_chunk(&mut data, b"VP8 ", &[0; 6]);

        let out = insert_iccp_chunk(&data, &[1, 2], 4, 4).unwrap();
        let chunks = parse_chunks(&out).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].payload[0], VP8X_ALPHA_FLAG | VP8X_ICC_FLAG);
        assert_eq!(chunks[1].fourcc, b"ICCP");
        assert_eq!(chunks[2].fourcc, b"ALPH");
    }

    #[test]
    fn test_rejects_non_webp() {
        assert!(insert_iccp_chunk(b"not a riff file", &[1], 1, 1).is_err());
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_encode_keeps_alpha_and_dimensions() {
        use image::{GenericImageView, Rgba, RgbaImage};
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(20, 10, |x, _| {
            Rgba([200, 100, 50, if x < 10 { 255 } else { 0 }])
        }));
        let bytes = encode(&image, &EncodeOptions::default(), Some(&[3; 40])).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(15, 5).0[3], 0);
    }
}
