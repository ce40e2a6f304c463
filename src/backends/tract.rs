//! Tract backend: pure Rust inference, CPU only

use crate::{
    config::InferenceConfig,
    error::{BgReplaceError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig, ResolvedModel},
};
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models without native dependencies
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    resolved: ResolvedModel,
    model_size: usize,
    initialized: bool,
}

impl TractBackend {
    /// Tract only runs on the CPU
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Create an uninitialized backend for `model`
    #[must_use]
    pub fn new(model: ResolvedModel) -> Self {
        Self {
            model: None,
            resolved: model,
            model_size: 0,
            initialized: false,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = self.resolved.load_data()?;
        self.model_size = model_data.len();

        log::info!(
            "Initializing Tract backend with {} ({})",
            self.resolved.name,
            crate::cache::format_size(self.model_size as u64)
        );

        let [height, width] = self.resolved.preprocessing.target_size;
        let input_fact = f32::fact([1, 3, height as usize, width as usize]);

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgReplaceError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, input_fact.into())
            .map_err(|e| BgReplaceError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgReplaceError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgReplaceError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &InferenceConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        if config.intra_threads > 0 {
            log::debug!("Tract ignores the thread count setting");
        }
        self.load_model().map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgReplaceError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgReplaceError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgReplaceError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor
            .to_array_view::<f32>()
            .map_err(|e| BgReplaceError::inference(format!("Failed to convert output tensor: {e}")))?;

        let shape = output_data.shape().to_vec();
        let [n, c, h, w] = shape.as_slice() else {
            return Err(BgReplaceError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };
        let output_array = Array4::from_shape_vec(
            (*n, *c, *h, *w),
            output_data.iter().copied().collect(),
        )
        .map_err(|e| BgReplaceError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
        );
        Ok(output_array)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.resolved.preprocessing
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.resolved.info(self.model_size))
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
            preprocessing: ModelSource::Named("isnet-general-use".into()).preprocessing(),
        }
    }

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new(resolved(PathBuf::from("m.onnx")));
        assert!(!backend.is_initialized());
        assert_eq!(backend.model_info().unwrap().input_shape, (1, 3, 1024, 1024));
        assert_eq!(backend.model_info().unwrap().output_shape, (1, 1, 1024, 1024));
    }

    #[test]
    fn test_tract_list_providers() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, "CPU");
        assert!(providers[0].1);
    }

    #[test]
    fn test_tract_rejects_invalid_model_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.onnx");
        std::fs::write(&path, [0u8, 1, 2, 3]).unwrap();

        let mut backend = TractBackend::new(resolved(path));
        assert!(backend.initialize(&InferenceConfig::default()).is_err());
        assert!(!backend.is_initialized());
        assert!(backend.infer(&Array4::zeros((1, 3, 8, 8))).is_err());
    }
}
