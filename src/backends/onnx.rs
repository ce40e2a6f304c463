//! ONNX Runtime backend with CPU, CUDA and `CoreML` execution providers

use crate::{
    config::{ExecutionProvider, InferenceConfig},
    error::{BgReplaceError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig, ResolvedModel},
};
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend for segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model: ResolvedModel,
    model_size: usize,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers as `(name, available, description)`
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("Platform: {} / {}", std::env::consts::OS, std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create an uninitialized backend for `model`
    #[must_use]
    pub fn new(model: ResolvedModel) -> Self {
        Self {
            session: None,
            model,
            model_size: 0,
            initialized: false,
        }
    }

    fn cuda() -> Option<ExecutionProviderDispatch> {
        let provider = CUDAExecutionProvider::default();
        if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
            Some(provider.build())
        } else {
            None
        }
    }

    fn coreml() -> Option<ExecutionProviderDispatch> {
        let provider = CoreMLExecutionProvider::default();
        if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
            Some(CoreMLExecutionProvider::default().with_subgraphs(true).build())
        } else {
            None
        }
    }

    /// Providers to register, in priority order; empty means CPU
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        match requested {
            ExecutionProvider::Auto => {
                let providers: Vec<_> = [Self::cuda(), Self::coreml()].into_iter().flatten().collect();
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                } else {
                    log::info!("Hardware acceleration enabled with {} provider(s)", providers.len());
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => Self::cuda().map_or_else(
                || {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| vec![p],
            ),
            ExecutionProvider::CoreMl => Self::coreml().map_or_else(
                || {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| vec![p],
            ),
        }
    }

    fn load_model(&mut self, config: &InferenceConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = self.model.load_data()?;
        self.model_size = model_data.len();

        let mut session_builder = Session::builder()
            .map_err(|e| BgReplaceError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgReplaceError::inference(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgReplaceError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgReplaceError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgReplaceError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgReplaceError::model(format!(
                    "Failed to create session for {}: {e}",
                    self.model.path.display()
                ))
            })?;

        log::debug!("ONNX Runtime session created");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Threading: {intra_threads} intra-op, {inter_threads} inter-op");
        log::debug!(
            "  - Model: {} ({})",
            self.model.name,
            crate::cache::format_size(self.model_size as u64)
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model {} loaded in {:.0}ms",
            self.model.name,
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &InferenceConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if !self.initialized {
            return Err(BgReplaceError::internal("Backend not initialized"));
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgReplaceError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| BgReplaceError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgReplaceError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: segmentation models put the finest mask first
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| BgReplaceError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| BgReplaceError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgReplaceError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        let [n, c, h, w] = shape.as_slice() else {
            return Err(BgReplaceError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let result = Array4::from_shape_vec(
            (*n, *c, *h, *w),
            output_tensor.iter().copied().collect(),
        )
        .map_err(|e| BgReplaceError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.model.preprocessing
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.model.info(self.model_size))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSource;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn resolved(path: PathBuf) -> ResolvedModel {
        ResolvedModel {
            name: "test".to_string(),
            path,
            preprocessing: ModelSource::default().preprocessing(),
        }
    }

    #[test]
    fn test_new_backend_is_uninitialized() {
        let backend = OnnxBackend::new(resolved(PathBuf::from("missing.onnx")));
        assert!(!backend.is_initialized());
        assert_eq!(backend.preprocessing_config().target_size, [320, 320]);
        assert_eq!(backend.model_info().unwrap().input_shape, (1, 3, 320, 320));
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::new(resolved(PathBuf::from("missing.onnx")));
        assert!(backend.infer(&Array4::zeros((1, 3, 320, 320))).is_err());
    }

    #[test]
    fn test_initialize_with_missing_file_fails() {
        let mut backend = OnnxBackend::new(resolved(PathBuf::from("/no/such/model.onnx")));
        assert!(backend.initialize(&InferenceConfig::default()).is_err());
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_initialize_with_garbage_model_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.onnx");
        std::fs::write(&path, b"definitely not a protobuf").unwrap();

        let mut backend = OnnxBackend::new(resolved(path));
        let config = InferenceConfig {
            execution_provider: ExecutionProvider::Cpu,
            ..InferenceConfig::default()
        };
        assert!(backend.initialize(&config).is_err());
    }

    #[test]
    fn test_list_providers_includes_cpu() {
        let providers = OnnxBackend::list_providers();
        assert!(providers.iter().any(|(name, available, _)| name == "CPU" && *available));
    }
}
