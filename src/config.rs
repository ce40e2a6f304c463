//! Configuration types for background replacement runs

use crate::{
    error::{BgReplaceError, Result},
    filters::ColorFilter,
    models::ModelSource,
    resize::ResizeSpec,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Settings handed to an inference backend when it loads a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InferenceConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// PNG with alpha channel
    #[default]
    Png,
    /// JPEG (no transparency, alpha is flattened)
    Jpeg,
    /// Lossy WebP with alpha channel
    WebP,
    /// AVIF with alpha channel
    Avif,
}

impl OutputFormat {
    /// All formats the encoder stage can write
    pub const ALL: [OutputFormat; 4] = [Self::Png, Self::Jpeg, Self::WebP, Self::Avif];

    /// Default file extension (without the dot) for generated file names
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    /// Whether the encoded file keeps an alpha channel
    #[must_use]
    pub fn supports_transparency(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

}

impl std::str::FromStr for OutputFormat {
    type Err = BgReplaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            "avif" => Ok(Self::Avif),
            other => Err(BgReplaceError::unsupported_format(format!(
                "{other} (supported: PNG, JPG, JPEG, WEBP, AVIF)"
            ))),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::WebP => "WEBP",
            Self::Avif => "AVIF",
        };
        f.write_str(name)
    }
}

/// Encoder options shared by every output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Lossy quality 1-100 (JPEG, WebP, AVIF)
    pub quality: u8,
    /// Progressive scan (JPEG only)
    pub progressive: bool,
    /// Drop the carried ICC profile
    pub strip_metadata: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 90,
            progressive: false,
            strip_metadata: false,
        }
    }
}

impl EncodeOptions {
    /// Preset for web delivery: progressive scan, no metadata
    #[must_use]
    pub fn web_optimized(quality: u8) -> Self {
        Self {
            quality,
            progressive: true,
            strip_metadata: true,
        }
    }
}

/// Color grading applied to the cutout before enhancement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorAdjustments {
    pub filter: Option<ColorFilter>,
    /// 0 = greyscale, 1 = unchanged
    pub saturation: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            filter: None,
            saturation: 1.0,
        }
    }
}

impl ColorAdjustments {
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.filter.is_none() && (self.saturation - 1.0).abs() < f32::EPSILON
    }
}

/// Tone and edge enhancement factors; 1.0 is identity for the three factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Enhancements {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    /// Gaussian blur of the alpha channel, in pixels
    pub feather: u32,
}

impl Default for Enhancements {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            sharpness: 1.0,
            feather: 0,
        }
    }
}

impl Enhancements {
    #[must_use]
    pub fn is_identity(&self) -> bool {
        (self.brightness - 1.0).abs() < f32::EPSILON
            && (self.contrast - 1.0).abs() < f32::EPSILON
            && (self.sharpness - 1.0).abs() < f32::EPSILON
            && self.feather == 0
    }
}

/// Where the new background comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundSource {
    /// Solid RGBA color
    Color([u8; 4]),
    /// Image file, stretched to the foreground size
    Image(PathBuf),
}

impl Default for BackgroundSource {
    fn default() -> Self {
        Self::Color([255, 255, 255, 255])
    }
}

/// Complete configuration for a [`crate::BackgroundReplacer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Segmentation model (registry name or `.onnx` path)
    pub model: ModelSource,
    /// Backend type to use for inference
    pub backend_type: BackendType,
    /// Provider and threading for the backend
    pub inference: InferenceConfig,
    /// Refine mask edges with alpha matting
    pub alpha_matting: bool,
    /// Emit the segmentation mask instead of a composite
    pub mask_only: bool,
    pub adjustments: ColorAdjustments,
    pub enhancements: Enhancements,
    pub background: BackgroundSource,
    pub resize: ResizeSpec,
    pub output_format: OutputFormat,
    /// Extension for generated file names, e.g. `jpeg` instead of `jpg`
    #[serde(default)]
    pub file_extension: Option<String>,
    pub encode: EncodeOptions,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            model: ModelSource::default(),
            backend_type: BackendType::default(),
            inference: InferenceConfig::default(),
            alpha_matting: false,
            mask_only: false,
            adjustments: ColorAdjustments::default(),
            enhancements: Enhancements::default(),
            background: BackgroundSource::default(),
            resize: ResizeSpec::default(),
            output_format: OutputFormat::default(),
            file_extension: None,
            encode: EncodeOptions::default(),
        }
    }
}

impl ProcessorConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgreplace::{OutputFormat, ProcessorConfig};
    ///
    /// let config = ProcessorConfig::builder()
    ///     .output_format(OutputFormat::WebP)
    ///     .quality(80)
    ///     .saturation(1.2)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.encode.quality, 80);
    /// ```
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Extension used when naming output files
    #[must_use]
    pub fn extension(&self) -> &str {
        self.file_extension
            .as_deref()
            .unwrap_or_else(|| self.output_format.extension())
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Quality outside 1-100
    /// - Negative or non-finite enhancement, saturation or scale factors
    /// - Zero resize dimensions
    /// - A file extension naming a different format than the one encoded
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.encode.quality) {
            return Err(BgReplaceError::config_value_error(
                "quality",
                self.encode.quality,
                "1-100",
                Some(90),
            ));
        }

        let factors = [
            ("saturation", self.adjustments.saturation),
            ("brightness", self.enhancements.brightness),
            ("contrast", self.enhancements.contrast),
            ("sharpness", self.enhancements.sharpness),
        ];
        for (name, value) in factors {
            if !value.is_finite() || value < 0.0 {
                return Err(BgReplaceError::config_value_error(
                    name,
                    value,
                    ">= 0.0",
                    Some(1.0),
                ));
            }
        }

        if let Some(ext) = &self.file_extension {
            if ext.parse::<OutputFormat>().ok() != Some(self.output_format) {
                return Err(BgReplaceError::invalid_config(format!(
                    "file extension '{ext}' does not match output format {}",
                    self.output_format
                )));
            }
        }

        self.resize.validate()
    }
}

/// Builder for [`ProcessorConfig`]
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the segmentation model
    #[must_use]
    pub fn model(mut self, model: ModelSource) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.inference.execution_provider = provider;
        self
    }

    /// Set both intra and inter threads (0 = auto-detect)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.inference.intra_threads = threads;
        self.config.inference.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.alpha_matting = enabled;
        self
    }

    #[must_use]
    pub fn mask_only(mut self, enabled: bool) -> Self {
        self.config.mask_only = enabled;
        self
    }

    #[must_use]
    pub fn color_filter(mut self, filter: Option<ColorFilter>) -> Self {
        self.config.adjustments.filter = filter;
        self
    }

    #[must_use]
    pub fn saturation(mut self, saturation: f32) -> Self {
        self.config.adjustments.saturation = saturation;
        self
    }

    #[must_use]
    pub fn brightness(mut self, factor: f32) -> Self {
        self.config.enhancements.brightness = factor;
        self
    }

    #[must_use]
    pub fn contrast(mut self, factor: f32) -> Self {
        self.config.enhancements.contrast = factor;
        self
    }

    #[must_use]
    pub fn sharpness(mut self, factor: f32) -> Self {
        self.config.enhancements.sharpness = factor;
        self
    }

    #[must_use]
    pub fn feather(mut self, radius: u32) -> Self {
        self.config.enhancements.feather = radius;
        self
    }

    #[must_use]
    pub fn background(mut self, background: BackgroundSource) -> Self {
        self.config.background = background;
        self
    }

    #[must_use]
    pub fn resize(mut self, resize: ResizeSpec) -> Self {
        self.config.resize = resize;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Name outputs with `extension` instead of the format's default one
    #[must_use]
    pub fn file_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.file_extension = Some(extension.into());
        self
    }

    /// Replace all encoder options at once
    #[must_use]
    pub fn encode_options(mut self, encode: EncodeOptions) -> Self {
        self.config.encode = encode;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.config.encode.quality = quality;
        self
    }

    #[must_use]
    pub fn progressive(mut self, progressive: bool) -> Self {
        self.config.encode.progressive = progressive;
        self
    }

    #[must_use]
    pub fn strip_metadata(mut self, strip: bool) -> Self {
        self.config.encode.strip_metadata = strip;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any rule checked by [`ProcessorConfig::validate`]
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
