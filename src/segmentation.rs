//! Foreground segmentation: model sessions, tensor pre/post-processing and mask application

use crate::{
    cache::ModelCache,
    config::{BackendType, InferenceConfig},
    error::{BgReplaceError, Result},
    inference::{BackendFactory, InferenceBackend},
    models::{ModelSource, PreprocessingConfig},
};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbaImage};
use instant::Instant;
use ndarray::{s, Array4};
use tracing::{info_span, instrument};

/// Produces a foreground mask for an image
///
/// The mask has the image's dimensions; 255 marks the subject, 0 the background.
pub trait Segmenter {
    /// # Errors
    /// - Inference failures
    /// - Unexpected model output
    fn segment(&mut self, image: &DynamicImage) -> Result<GrayImage>;

    /// Name of the model behind this segmenter, for logs and reports
    fn model_name(&self) -> String;
}

/// An initialized model ready to segment any number of images
pub struct SegmentationSession {
    backend: Box<dyn InferenceBackend>,
    model_name: String,
}

impl std::fmt::Debug for SegmentationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationSession")
            .field("model_name", &self.model_name)
            .field("initialized", &self.backend.is_initialized())
            .finish_non_exhaustive()
    }
}

impl SegmentationSession {
    /// Wrap and initialize a backend
    ///
    /// # Errors
    /// - Backend initialization failures
    pub fn new(
        mut backend: Box<dyn InferenceBackend>,
        model_name: impl Into<String>,
        inference: &InferenceConfig,
    ) -> Result<Self> {
        let model_name = model_name.into();
        if let Some(load_time) = backend.initialize(inference)? {
            log::debug!("Model {} ready in {}ms", model_name, load_time.as_millis());
        }
        Ok(Self {
            backend,
            model_name,
        })
    }

    /// Resolve `source` and load it on the requested backend
    ///
    /// # Errors
    /// - Model not found or not cached
    /// - Backend unavailable or failing to load the model
    pub fn open(
        source: &ModelSource,
        backend_type: BackendType,
        inference: &InferenceConfig,
        cache: &ModelCache,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let _span = info_span!("load_model", model = %source.display_name(), backend = %backend_type).entered();
        let resolved = source.resolve(cache)?;
        let name = resolved.name.clone();
        let backend = factory.create_backend(backend_type, resolved)?;
        Self::new(backend, name, inference)
    }

    /// Like [`Self::open`], but a model that fails to load is replaced by the default model
    ///
    /// # Errors
    /// - The default model also fails to load
    pub fn open_with_fallback(
        source: &ModelSource,
        backend_type: BackendType,
        inference: &InferenceConfig,
        cache: &ModelCache,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        match Self::open(source, backend_type, inference, cache, factory) {
            Ok(session) => Ok(session),
            Err(e) if *source != ModelSource::default() => {
                log::warn!(
                    "Failed to load model {} ({}), falling back to {}",
                    source.display_name(),
                    e,
                    crate::models::DEFAULT_MODEL
                );
                Self::open(&ModelSource::default(), backend_type, inference, cache, factory)
            },
            Err(e) => Err(e),
        }
    }
}

impl Segmenter for SegmentationSession {
    #[instrument(skip_all, fields(model = %self.model_name, width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &DynamicImage) -> Result<GrayImage> {
        let start = Instant::now();
        let config = self.backend.preprocessing_config();

        let input = ImagePreprocessor::preprocess_image(image, &config)?;
        let output = self.backend.infer(&input)?;
        let mask = postprocess_mask(&output, &config, image.width(), image.height())?;

        log::debug!("Segmentation took {}ms", start.elapsed().as_millis());
        Ok(mask)
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }
}

/// Image to tensor conversion for segmentation models
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// RGB, Lanczos3 resize to the model's square input (aspect not kept),
    /// scale by the brightest channel value, normalize, NCHW layout
    ///
    /// # Errors
    /// - Empty input image
    pub fn preprocess_image(image: &DynamicImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BgReplaceError::processing_stage_error(
                "preprocessing",
                "image has no pixels",
                None,
            ));
        }

        let [height, width] = config.target_size;
        let resized = image::imageops::resize(&image.to_rgb8(), width, height, FilterType::Lanczos3);

        let max_value = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(1e-6, |m| f32::from(m).max(1e-6));

        let mean = config.normalization_mean;
        let std = config.normalization_std;
        let tensor = Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let value = resized.get_pixel(x as u32, y as u32).0.get(c).copied().unwrap_or(0);
                let (m, s) = (mean.get(c).copied().unwrap_or(0.0), std.get(c).copied().unwrap_or(1.0));
                (f32::from(value) / max_value - m) / s
            },
        );
        Ok(tensor)
    }
}

/// Turn raw model output into a mask at the original image size
///
/// Uses the first channel, applies a sigmoid if the model emits logits,
/// min-max normalizes and resizes with Lanczos3.
///
/// # Errors
/// - Empty output tensor
pub fn postprocess_mask(
    output: &Array4<f32>,
    config: &PreprocessingConfig,
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    let (batch, channels, out_h, out_w) = output.dim();
    if batch == 0 || channels == 0 || out_h == 0 || out_w == 0 {
        return Err(BgReplaceError::processing_stage_error(
            "postprocessing",
            &format!("empty model output {:?}", output.dim()),
            None,
        ));
    }

    let mut prediction = output.slice(s![0, 0, .., ..]).to_owned();
    if config.sigmoid_output {
        prediction.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
    }

    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    let pixels: Vec<u8> = prediction
        .iter()
        .map(|&v| {
            // A constant prediction carries no contrast to stretch
            let normalized = if range > f32::EPSILON { (v - min) / range } else { v.clamp(0.0, 1.0) };
            (normalized * 255.0) as u8
        })
        .collect();

    let mask = GrayImage::from_raw(out_w as u32, out_h as u32, pixels)
        .ok_or_else(|| BgReplaceError::internal("Mask buffer size mismatch"))?;

    if mask.dimensions() == (width, height) {
        Ok(mask)
    } else {
        Ok(image::imageops::resize(&mask, width, height, FilterType::Lanczos3))
    }
}

/// Naive cutout: colors scaled by the mask, mask as alpha
///
/// Pixels outside the mask come out as transparent black, so widening the
/// alpha later (feathering) cannot bring the old backdrop back.
///
/// # Errors
/// - Mask and image dimensions differ
pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
    if mask.dimensions() != (image.width(), image.height()) {
        return Err(BgReplaceError::processing_stage_error(
            "apply_mask",
            &format!(
                "mask is {}x{} but image is {}x{}",
                mask.width(),
                mask.height(),
                image.width(),
                image.height()
            ),
            None,
        ));
    }

    let mut rgba = image.to_rgba8();
    for (pixel, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
        let a = alpha.0[0];
        for channel in &mut pixel.0[..3] {
            *channel = scale_by_alpha(*channel, a);
        }
        pixel.0[3] = a;
    }
    Ok(rgba)
}

/// `value * alpha / 255`, rounded
#[must_use]
pub(crate) fn scale_by_alpha(value: u8, alpha: u8) -> u8 {
    ((u16::from(value) * u16::from(alpha) + 127) / 255) as u8
}
