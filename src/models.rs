//! Segmentation model registry and model resolution

use crate::{
    cache::ModelCache,
    error::{BgReplaceError, Result},
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Model used when none is requested and when a requested model fails to load
pub const DEFAULT_MODEL: &str = "u2net";

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const HALF_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const UNIT_STD: [f32; 3] = [1.0, 1.0, 1.0];

/// How a model expects its input tensor and what its output looks like
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input size `[height, width]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    /// Output holds logits that need a sigmoid before normalization
    pub sigmoid_output: bool,
}

impl PreprocessingConfig {
    const fn square(size: u32, mean: [f32; 3], std: [f32; 3], sigmoid_output: bool) -> Self {
        Self {
            target_size: [size, size],
            normalization_mean: mean,
            normalization_std: std,
            sigmoid_output,
        }
    }
}

/// Registry entry for a downloadable model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelDescriptor {
    pub name: &'static str,
    /// File name of the release asset
    pub file_name: &'static str,
    pub description: &'static str,
    pub preprocessing: PreprocessingConfig,
}

impl ModelDescriptor {
    /// Download URL of the model weights
    #[must_use]
    pub fn url(&self) -> String {
        format!("{RELEASE_BASE_URL}/{}", self.file_name)
    }
}

const U2NET: ModelDescriptor = ModelDescriptor {
    name: DEFAULT_MODEL,
    file_name: "u2net.onnx",
    description: "General purpose salient object segmentation",
    preprocessing: PreprocessingConfig::square(320, IMAGENET_MEAN, IMAGENET_STD, false),
};

/// Every model the CLI can download by name
pub static MODEL_REGISTRY: &[ModelDescriptor] = &[
    U2NET,
    ModelDescriptor {
        name: "u2netp",
        file_name: "u2netp.onnx",
        description: "Lightweight u2net",
        preprocessing: PreprocessingConfig::square(320, IMAGENET_MEAN, IMAGENET_STD, false),
    },
    ModelDescriptor {
        name: "u2net_human_seg",
        file_name: "u2net_human_seg.onnx",
        description: "Human segmentation",
        preprocessing: PreprocessingConfig::square(320, IMAGENET_MEAN, IMAGENET_STD, false),
    },
    ModelDescriptor {
        name: "silueta",
        file_name: "silueta.onnx",
        description: "Compact u2net variant",
        preprocessing: PreprocessingConfig::square(320, IMAGENET_MEAN, IMAGENET_STD, false),
    },
    ModelDescriptor {
        name: "isnet-general-use",
        file_name: "isnet-general-use.onnx",
        description: "IS-Net general use",
        preprocessing: PreprocessingConfig::square(1024, HALF_MEAN, UNIT_STD, false),
    },
    ModelDescriptor {
        name: "isnet-anime",
        file_name: "isnet-anime.onnx",
        description: "IS-Net for anime characters",
        preprocessing: PreprocessingConfig::square(1024, HALF_MEAN, UNIT_STD, false),
    },
    ModelDescriptor {
        name: "birefnet-general",
        file_name: "BiRefNet-general-epoch_244.onnx",
        description: "BiRefNet general use",
        preprocessing: PreprocessingConfig::square(1024, IMAGENET_MEAN, IMAGENET_STD, true),
    },
    ModelDescriptor {
        name: "birefnet-general-lite",
        file_name: "BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx",
        description: "BiRefNet general use, tiny backbone",
        preprocessing: PreprocessingConfig::square(1024, IMAGENET_MEAN, IMAGENET_STD, true),
    },
    ModelDescriptor {
        name: "birefnet-portrait",
        file_name: "BiRefNet-portrait-epoch_150.onnx",
        description: "BiRefNet for portraits",
        preprocessing: PreprocessingConfig::square(1024, IMAGENET_MEAN, IMAGENET_STD, true),
    },
    ModelDescriptor {
        name: "birefnet-massive",
        file_name: "BiRefNet-massive-TR_DIS5K_TR_TEs-epoch_420.onnx",
        description: "BiRefNet trained on a massive dataset",
        preprocessing: PreprocessingConfig::square(1024, IMAGENET_MEAN, IMAGENET_STD, true),
    },
    ModelDescriptor {
        name: "bria-rmbg",
        file_name: "bria-rmbg-2.0.onnx",
        description: "BRIA RMBG 2.0",
        preprocessing: PreprocessingConfig::square(1024, HALF_MEAN, UNIT_STD, false),
    },
];

/// Look up a registry entry by name (case-insensitive)
#[must_use]
pub fn find_model(name: &str) -> Option<&'static ModelDescriptor> {
    MODEL_REGISTRY
        .iter()
        .find(|model| model.name.eq_ignore_ascii_case(name.trim()))
}

/// The default model's registry entry
#[must_use]
pub fn default_model() -> &'static ModelDescriptor {
    &U2NET
}

/// Comma-separated registry names for error messages
#[must_use]
pub fn available_model_names() -> String {
    MODEL_REGISTRY
        .iter()
        .map(|model| model.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where the segmentation model comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Registry model, downloaded into the cache on demand
    Named(String),
    /// Local `.onnx` file
    External(PathBuf),
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Named(DEFAULT_MODEL.to_string())
    }
}

impl ModelSource {
    /// Interpret a `--model` argument
    ///
    /// Paths ending in `.onnx` and existing files are external models,
    /// anything else is a registry name.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let path = Path::new(trimmed);
        let is_onnx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
        if is_onnx || path.is_file() {
            Self::External(path.to_path_buf())
        } else {
            Self::Named(trimmed.to_ascii_lowercase())
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }

    /// Registry entry for named models and for external files named after one
    #[must_use]
    pub fn descriptor(&self) -> Option<&'static ModelDescriptor> {
        match self {
            Self::Named(name) => find_model(name),
            Self::External(path) => {
                let stem = path.file_stem()?.to_str()?;
                MODEL_REGISTRY.iter().find(|model| {
                    model.name.eq_ignore_ascii_case(stem)
                        || Path::new(model.file_name)
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .is_some_and(|s| s.eq_ignore_ascii_case(stem))
                })
            },
        }
    }

    /// Preprocessing for this source; unknown external files use the default model's
    #[must_use]
    pub fn preprocessing(&self) -> PreprocessingConfig {
        self.descriptor()
            .unwrap_or_else(default_model)
            .preprocessing
    }

    /// Locate the model file
    ///
    /// # Errors
    /// - Unknown registry name
    /// - Registry model not present in the cache
    /// - External file does not exist
    pub fn resolve(&self, cache: &ModelCache) -> Result<ResolvedModel> {
        let path = match self {
            Self::Named(name) => {
                let descriptor = find_model(name).ok_or_else(|| {
                    BgReplaceError::model(format!(
                        "Unknown model '{name}' (available: {})",
                        available_model_names()
                    ))
                })?;
                if !cache.is_model_cached(descriptor.name) {
                    return Err(BgReplaceError::model(format!(
                        "Model '{}' is not in the cache at {}",
                        descriptor.name,
                        cache.cache_dir().display()
                    )));
                }
                cache.model_path(descriptor.name)
            },
            Self::External(path) => {
                if !path.is_file() {
                    return Err(BgReplaceError::model(format!(
                        "Model file not found: {}",
                        path.display()
                    )));
                }
                path.clone()
            },
        };

        Ok(ResolvedModel {
            name: self.display_name(),
            path,
            preprocessing: self.preprocessing(),
        })
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize),  // NCHW format
    pub output_shape: (usize, usize, usize, usize), // single channel mask
}

/// A model file on disk together with its preprocessing
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub name: String,
    pub path: PathBuf,
    pub preprocessing: PreprocessingConfig,
}

impl ResolvedModel {
    /// Read the model weights
    ///
    /// # Errors
    /// - File read errors
    pub fn load_data(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| BgReplaceError::file_io_error("read model file", &self.path, &e))
    }

    /// Shape information for a model of `size_bytes`
    #[must_use]
    pub fn info(&self, size_bytes: usize) -> ModelInfo {
        let [height, width] = self.preprocessing.target_size;
        ModelInfo {
            name: self.name.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        }
    }
}
