//! Image file input/output
//!
//! Decoding keeps the embedded ICC profile so the encoder can write it back.
//! Camera RAW files go through `imagepipe` when the `raw-support` feature is on.

use crate::{
    config::{EncodeOptions, OutputFormat},
    error::{BgReplaceError, Result},
};
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// Extensions handled by the RAW pipeline
pub const RAW_EXTENSIONS: &[&str] = &[
    "3fr", "arw", "cr2", "crw", "dcr", "dng", "erf", "kdc", "mef", "mos", "mrw", "nef", "nrw",
    "orf", "pef", "raf", "rw2", "srw",
];

const RASTER_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "avif", "bmp", "tif", "tiff", "gif", "tga", "ico", "pnm",
    "ppm", "pgm", "pbm", "qoi", "hdr", "exr",
];

/// A decoded image plus the metadata worth carrying to the output
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: DynamicImage,
    pub icc_profile: Option<Vec<u8>>,
}

impl LoadedImage {
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            icc_profile: None,
        }
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Whether `path` has an extension this build can decode
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        let Some(ext) = lowercase_extension(path.as_ref()) else {
            return false;
        };
        RASTER_EXTENSIONS.contains(&ext.as_str())
            || (cfg!(feature = "raw-support") && RAW_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Whether `path` names a camera RAW file
    pub fn is_raw_file<P: AsRef<Path>>(path: P) -> bool {
        lowercase_extension(path.as_ref()).is_some_and(|ext| RAW_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Decode an image file along with its ICC profile
    ///
    /// The format is guessed from content first, so misnamed files still load.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Undecodable content
    /// - RAW file without `raw-support`
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<LoadedImage> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BgReplaceError::file_io_error(
                "read image file",
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        if Self::is_raw_file(path) {
            return Self::load_raw(path).map(LoadedImage::new);
        }

        let reader = ImageReader::open(path)
            .map_err(|e| BgReplaceError::file_io_error("open image file", path, &e))?
            .with_guessed_format()
            .map_err(|e| BgReplaceError::file_io_error("detect image format", path, &e))?;

        let mut decoder = reader.into_decoder().map_err(|e| {
            BgReplaceError::processing_stage_error(
                "image loading",
                &e.to_string(),
                Some(&format!("path: {}", path.display())),
            )
        })?;

        let icc_profile = match decoder.icc_profile() {
            Ok(profile) => profile,
            Err(e) => {
                log::debug!("Failed to read ICC profile from {}: {e}", path.display());
                None
            },
        };
        if let Some(icc) = &icc_profile {
            log::debug!("Found {} byte ICC profile in {}", icc.len(), path.display());
        }

        let image = DynamicImage::from_decoder(decoder).map_err(|e| {
            BgReplaceError::processing_stage_error(
                "image loading",
                &e.to_string(),
                Some(&format!("path: {}", path.display())),
            )
        })?;

        Ok(LoadedImage { image, icc_profile })
    }

    #[cfg(feature = "raw-support")]
    fn load_raw(path: &Path) -> Result<DynamicImage> {
        let path_str = path.to_str().ok_or_else(|| {
            BgReplaceError::invalid_config(format!("Non UTF-8 path: {}", path.display()))
        })?;

        log::debug!("Decoding RAW file {}", path.display());
        let decoded = imagepipe::simple_decode_8bit(path_str, 0, 0).map_err(|e| {
            BgReplaceError::processing_stage_error(
                "raw decoding",
                &e,
                Some(&format!("path: {}", path.display())),
            )
        })?;

        let width = u32::try_from(decoded.width)
            .map_err(|_| BgReplaceError::processing("RAW image width out of range"))?;
        let height = u32::try_from(decoded.height)
            .map_err(|_| BgReplaceError::processing("RAW image height out of range"))?;
        image::RgbImage::from_raw(width, height, decoded.data)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| BgReplaceError::processing("RAW decoder returned a short buffer"))
    }

    #[cfg(not(feature = "raw-support"))]
    fn load_raw(path: &Path) -> Result<DynamicImage> {
        Err(BgReplaceError::unsupported_format(format!(
            "{} (RAW support is not enabled in this build)",
            path.display()
        )))
    }

    /// Encode and write `image`, creating parent directories as needed
    ///
    /// # Errors
    /// - Encoding failures
    /// - Filesystem errors
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        options: &EncodeOptions,
        icc_profile: Option<&[u8]>,
    ) -> Result<u64> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BgReplaceError::file_io_error("create output directory", parent, &e))?;
        }

        let bytes = crate::encoders::encode_image(image, format, options, icc_profile)?;
        std::fs::write(path, &bytes)
            .map_err(|e| BgReplaceError::file_io_error("write output file", path, &e))?;

        log::debug!(
            "Wrote {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            format
        );
        Ok(bytes.len() as u64)
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase)
}
