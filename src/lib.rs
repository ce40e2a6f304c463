#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgreplace
//!
//! Background replacement for photographs: segment the subject with a
//! pretrained ONNX model, optionally refine the edges with alpha matting,
//! grade and enhance the cutout, then composite it onto a solid color or
//! another image and encode the result.
//!
//! ## Features
//!
//! - **Segmentation**: rembg-compatible models (`u2net`, `isnet-*`, `birefnet-*`, ...)
//!   on ONNX Runtime or the pure Rust Tract backend, downloaded and cached on first use
//! - **Alpha matting**: trimap plus guided filter with Blur-Fusion color estimation
//! - **Grading**: color filter presets, saturation, brightness, contrast, sharpness, feather
//! - **Output**: PNG, JPEG, WebP and AVIF with quality, progressive and ICC profile handling
//! - **Responsive sets**: one encoded copy per breakpoint width
//! - **RAW input**: camera RAW decoding via `imagepipe` (`raw-support` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgreplace::{BackgroundReplacer, BackgroundSource, OutputFormat, ProcessorConfig};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = ProcessorConfig::builder()
//!     .background(BackgroundSource::Color([20, 40, 200, 255]))
//!     .output_format(OutputFormat::WebP)
//!     .quality(85)
//!     .build()?;
//!
//! // Expects the model in the cache; the CLI downloads it on demand
//! let mut replacer = BackgroundReplacer::new(config)?;
//! let report = replacer.process_file(Path::new("portrait.jpg"), Path::new("portrait.webp"))?;
//! println!("wrote {} bytes", report.bytes_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom segmentation
//!
//! Anything implementing [`Segmenter`] can drive the pipeline, which is how
//! the tests run without model files:
//!
//! ```rust
//! use bgreplace::{BackgroundReplacer, ProcessorConfig, Result, Segmenter};
//! use image::{DynamicImage, GrayImage, Luma};
//!
//! struct Everything;
//!
//! impl Segmenter for Everything {
//!     fn segment(&mut self, image: &DynamicImage) -> Result<GrayImage> {
//!         Ok(GrayImage::from_pixel(image.width(), image.height(), Luma([255])))
//!     }
//!     fn model_name(&self) -> String {
//!         "everything".to_string()
//!     }
//! }
//!
//! let mut replacer = BackgroundReplacer::with_segmenter(ProcessorConfig::default(), Box::new(Everything)).unwrap();
//! let out = replacer.render(&DynamicImage::new_rgb8(4, 4)).unwrap();
//! assert_eq!((out.width(), out.height()), (4, 4));
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend
//! - `tract` (default): pure Rust backend
//! - `cli` (default): the `bgreplace` binary, progress bars and tracing setup
//! - `webp-support`, `avif-support`, `raw-support` (default): codecs
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod compositing;
pub mod config;
pub mod download;
pub mod encoders;
pub mod enhance;
pub mod error;
pub mod filters;
pub mod inference;
pub mod matting;
pub mod models;
pub mod processor;
pub mod resize;
pub mod responsive;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;

pub use backends::DefaultBackendFactory;
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use color::parse_color;
pub use compositing::Background;
pub use config::{
    BackendType, BackgroundSource, ColorAdjustments, EncodeOptions, Enhancements,
    ExecutionProvider, InferenceConfig, OutputFormat, ProcessorConfig, ProcessorConfigBuilder,
};
pub use download::ModelDownloader;
pub use error::{BgReplaceError, Result};
pub use filters::ColorFilter;
pub use inference::{BackendFactory, InferenceBackend};
pub use models::{ModelDescriptor, ModelSource, DEFAULT_MODEL};
pub use processor::{BackgroundReplacer, ProcessingReport, StageTimings};
pub use resize::ResizeSpec;
pub use segmentation::{SegmentationSession, Segmenter};
pub use services::{ImageIOService, LoadedImage, OutputFormatHandler};
pub use utils::{ExecutionProviderManager, ProviderInfo};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
