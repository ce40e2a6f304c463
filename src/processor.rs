//! The background replacement pipeline
//!
//! [`BackgroundReplacer`] owns one segmentation session and one decoded
//! background, and runs every file of a batch through the same stages:
//! segment, (matte), color filter, enhance, composite, resize, encode.

use crate::{
    backends::DefaultBackendFactory,
    cache::ModelCache,
    compositing::{composite, Background},
    config::ProcessorConfig,
    enhance::apply_enhancements,
    error::Result,
    filters::apply_color_filter,
    matting::alpha_matting_cutout,
    resize::ResizeSpec,
    responsive,
    segmentation::{apply_mask, SegmentationSession, Segmenter},
    services::{ImageIOService, LoadedImage, OutputFormatHandler},
};
use image::{DynamicImage, GrayImage, RgbaImage};
use instant::Instant;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info_span, instrument};

/// Wall-clock milliseconds spent in each stage of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub decode_ms: u64,
    pub segmentation_ms: u64,
    pub adjustments_ms: u64,
    pub composite_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Outcome of processing one input file
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub input: PathBuf,
    /// Written files; several in responsive mode, possibly none when every breakpoint was skipped
    pub outputs: Vec<PathBuf>,
    pub model: String,
    pub original_dimensions: (u32, u32),
    pub output_dimensions: Vec<(u32, u32)>,
    pub bytes_written: u64,
    pub timings: StageTimings,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Background replacement processor
pub struct BackgroundReplacer {
    config: ProcessorConfig,
    segmenter: Box<dyn Segmenter>,
    background: Background,
}

impl std::fmt::Debug for BackgroundReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundReplacer")
            .field("config", &self.config)
            .field("model", &self.segmenter.model_name())
            .finish_non_exhaustive()
    }
}

impl BackgroundReplacer {
    /// Load the configured model from the default cache
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Neither the configured nor the default model can be loaded
    /// - Background image unreadable
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let cache = ModelCache::new()?;
        Self::with_cache(config, &cache)
    }

    /// Load the configured model from `cache`
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Neither the configured nor the default model can be loaded
    /// - Background image unreadable
    pub fn with_cache(config: ProcessorConfig, cache: &ModelCache) -> Result<Self> {
        config.validate()?;
        let session = SegmentationSession::open_with_fallback(
            &config.model,
            config.backend_type,
            &config.inference,
            cache,
            &DefaultBackendFactory,
        )?;
        Self::with_segmenter(config, Box::new(session))
    }

    /// Use a caller-supplied segmenter instead of loading a model
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Background image unreadable
    pub fn with_segmenter(config: ProcessorConfig, segmenter: Box<dyn Segmenter>) -> Result<Self> {
        config.validate()?;
        let background = Background::from_source(&config.background)?;
        log::info!("Using model {}", segmenter.model_name());
        Ok(Self {
            config,
            segmenter,
            background,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn model_name(&self) -> String {
        self.segmenter.model_name()
    }

    /// Segment `image` and return the mask with the cut-out subject
    ///
    /// # Errors
    /// - Segmentation failures
    pub fn cut_out(&mut self, image: &DynamicImage) -> Result<(GrayImage, RgbaImage)> {
        let mask = self.segmenter.segment(image)?;
        let cutout = if self.config.alpha_matting {
            let _span = info_span!("alpha_matting").entered();
            alpha_matting_cutout(image, &mask)?
        } else {
            apply_mask(image, &mask)?
        };
        Ok((mask, cutout))
    }

    /// Everything up to and including compositing; no resize
    ///
    /// # Errors
    /// - Segmentation failures
    pub fn render_composite(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        self.render_composite_timed(image, &mut StageTimings::default())
    }

    /// Produce the final image for `image`: the mask in mask-only mode,
    /// otherwise the resized composite
    ///
    /// # Errors
    /// - Segmentation failures
    pub fn render(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        self.render_timed(image, &mut StageTimings::default())
    }

    fn render_composite_timed(&mut self, image: &DynamicImage, timings: &mut StageTimings) -> Result<DynamicImage> {
        let start = Instant::now();
        let (_, cutout) = {
            let _span = info_span!("segmentation", model = %self.segmenter.model_name()).entered();
            self.cut_out(image)?
        };
        timings.segmentation_ms = elapsed_ms(start);

        let start = Instant::now();
        let mut subject = DynamicImage::ImageRgba8(cutout);
        if !self.config.adjustments.is_identity() {
            let _span = info_span!("color_filter").entered();
            subject = apply_color_filter(
                &subject,
                self.config.adjustments.filter,
                self.config.adjustments.saturation,
            );
        }
        if !self.config.enhancements.is_identity() {
            let _span = info_span!("enhance").entered();
            subject = apply_enhancements(&subject, &self.config.enhancements);
        }
        timings.adjustments_ms = elapsed_ms(start);

        let start = Instant::now();
        let composed = composite(&subject, &self.background);
        timings.composite_ms = elapsed_ms(start);

        Ok(DynamicImage::ImageRgba8(composed))
    }

    fn render_timed(&mut self, image: &DynamicImage, timings: &mut StageTimings) -> Result<DynamicImage> {
        if self.config.mask_only {
            let start = Instant::now();
            let mask = self.segmenter.segment(image)?;
            timings.segmentation_ms = elapsed_ms(start);
            return Ok(DynamicImage::ImageLuma8(mask));
        }

        let composed = self.render_composite_timed(image, timings)?;
        if self.config.resize.is_empty() {
            return Ok(composed);
        }
        let _span = info_span!("resize").entered();
        Ok(self.config.resize.apply(composed))
    }

    fn load(path: &Path, timings: &mut StageTimings) -> Result<LoadedImage> {
        let start = Instant::now();
        let loaded = {
            let _span = info_span!("decode").entered();
            ImageIOService::load_image(path)?
        };
        timings.decode_ms = elapsed_ms(start);
        log::debug!(
            "Loaded {} ({}x{})",
            path.display(),
            loaded.image.width(),
            loaded.image.height()
        );
        Ok(loaded)
    }

    fn save(&self, image: &DynamicImage, path: &Path, icc: Option<&[u8]>) -> Result<u64> {
        let format = self.config.output_format;
        if OutputFormatHandler::drops_alpha(image, format) {
            log::debug!("{format} has no alpha channel, transparency is discarded");
        }
        ImageIOService::save_image(image, path, format, &self.config.encode, icc)
    }

    /// Run the full pipeline on one file and write `output`
    ///
    /// # Errors
    /// - Decode, segmentation or encode failures
    #[instrument(skip(self), fields(model = %self.segmenter.model_name()))]
    pub fn process_file(&mut self, input: &Path, output: &Path) -> Result<ProcessingReport> {
        let total = Instant::now();
        let mut timings = StageTimings::default();

        let loaded = Self::load(input, &mut timings)?;
        let original_dimensions = (loaded.image.width(), loaded.image.height());
        let result = self.render_timed(&loaded.image, &mut timings)?;

        let start = Instant::now();
        let bytes_written = {
            let _span = info_span!("encode", format = %self.config.output_format).entered();
            self.save(&result, output, loaded.icc_profile.as_deref())?
        };
        timings.encode_ms = elapsed_ms(start);
        timings.total_ms = elapsed_ms(total);

        log::info!(
            "Saved {} ({}x{}, {}) in {}ms",
            output.display(),
            result.width(),
            result.height(),
            crate::cache::format_size(bytes_written),
            timings.total_ms
        );

        Ok(ProcessingReport {
            input: input.to_path_buf(),
            outputs: vec![output.to_path_buf()],
            model: self.segmenter.model_name(),
            original_dimensions,
            output_dimensions: vec![(result.width(), result.height())],
            bytes_written,
            timings,
        })
    }

    /// Composite once, then write one width-constrained copy per breakpoint
    ///
    /// Mask-only mode and the resize settings do not apply here.
    ///
    /// # Errors
    /// - Decode, segmentation or encode failures
    #[instrument(skip(self, breakpoints), fields(model = %self.segmenter.model_name()))]
    pub fn process_responsive(
        &mut self,
        input: &Path,
        output_dir: &Path,
        breakpoints: &[u32],
    ) -> Result<ProcessingReport> {
        let total = Instant::now();
        let mut timings = StageTimings::default();

        let loaded = Self::load(input, &mut timings)?;
        let original_dimensions = (loaded.image.width(), loaded.image.height());
        let composed = self.render_composite_timed(&loaded.image, &mut timings)?;

        let stem = input
            .file_stem()
            .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
        let extension = self.config.extension().to_string();

        let start = Instant::now();
        let mut outputs = Vec::new();
        let mut output_dimensions = Vec::new();
        let mut bytes_written = 0;
        for width in responsive::plan(composed.width(), breakpoints) {
            let _span = info_span!("breakpoint", width).entered();
            let resized = ResizeSpec::width(width).apply(composed.clone());
            let path = responsive::output_path(output_dir, &stem, width, &extension);
            bytes_written += self.save(&resized, &path, loaded.icc_profile.as_deref())?;
            log::info!(
                "Generated {} ({}x{})",
                path.display(),
                resized.width(),
                resized.height()
            );
            output_dimensions.push((resized.width(), resized.height()));
            outputs.push(path);
        }
        timings.encode_ms = elapsed_ms(start);
        timings.total_ms = elapsed_ms(total);

        Ok(ProcessingReport {
            input: input.to_path_buf(),
            outputs,
            model: self.segmenter.model_name(),
            original_dimensions,
            output_dimensions,
            bytes_written,
            timings,
        })
    }
}
