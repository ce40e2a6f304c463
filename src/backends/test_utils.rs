//! Mock inference backend for tests that must not touch model files

use crate::{
    config::InferenceConfig,
    error::{BgReplaceError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Backend that returns a soft circular mask centred in the frame
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    model_info: ModelInfo,
    preprocessing_config: PreprocessingConfig,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
    /// Emit raw logits instead of probabilities
    logits: bool,
}

impl MockBackend {
    /// Mock model with a square input of `size` pixels
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            initialized: false,
            model_info: ModelInfo {
                name: "mock-model".to_string(),
                size_bytes: 1024 * 1024,
                input_shape: (1, 3, size, size),
                output_shape: (1, 1, size, size),
            },
            preprocessing_config: PreprocessingConfig {
                target_size: [size as u32, size as u32],
                normalization_mean: [0.485, 0.456, 0.406],
                normalization_std: [0.229, 0.224, 0.225],
                sigmoid_output: false,
            },
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            logits: false,
        }
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new(32);
        backend.should_fail_init = true;
        backend
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new(32);
        backend.should_fail_inference = true;
        backend
    }

    /// Output logits (+8 inside the circle, -8 outside) and request a sigmoid
    #[must_use]
    pub fn with_logits(mut self) -> Self {
        self.logits = true;
        self.preprocessing_config.sigmoid_output = true;
        self
    }

    /// Shared handle to the call history
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self, batch_size: usize) -> Array4<f32> {
        let (_, _, height, width) = self.model_info.output_shape;
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = width.min(height) as f32 / 3.0;

        Array4::from_shape_fn((batch_size, 1, height, width), |(_, _, y, x)| {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let inside = (dx * dx + dy * dy).sqrt() < radius;
            match (self.logits, inside) {
                (true, true) => 8.0,
                (true, false) => -8.0,
                (false, true) => 1.0,
                (false, false) => 0.0,
            }
        })
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &InferenceConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgReplaceError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(150)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgReplaceError::inference("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgReplaceError::inference("Mock backend inference failed"));
        }

        let (batch, channels, _, _) = input.dim();
        if channels != 3 {
            return Err(BgReplaceError::inference(format!(
                "Expected 3 input channels, got {channels}"
            )));
        }

        Ok(self.generate_mock_output(batch))
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing_config
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output_is_circular() {
        let mut backend = MockBackend::new(30);
        backend.initialize(&InferenceConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 30, 30))).unwrap();

        assert_eq!(output[[0, 0, 15, 15]], 1.0);
        assert_eq!(output[[0, 0, 0, 0]], 0.0);
        assert_eq!(
            backend.call_history().lock().unwrap().as_slice(),
            ["initialize", "infer"]
        );
    }

    #[test]
    fn test_failure_modes() {
        let mut failing = MockBackend::new_failing_init();
        assert!(failing.initialize(&InferenceConfig::default()).is_err());

        let mut failing = MockBackend::new_failing_inference();
        failing.initialize(&InferenceConfig::default()).unwrap();
        assert!(failing.infer(&Array4::zeros((1, 3, 32, 32))).is_err());
    }

    #[test]
    fn test_logit_output() {
        let mut backend = MockBackend::new(12).with_logits();
        backend.initialize(&InferenceConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 12, 12))).unwrap();
        assert!(backend.preprocessing_config().sigmoid_output);
        assert_eq!(output[[0, 0, 6, 6]], 8.0);
        assert_eq!(output[[0, 0, 0, 0]], -8.0);
    }
}
