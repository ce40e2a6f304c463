//! Inference backend abstraction

use crate::{
    config::{BackendType, InferenceConfig},
    error::Result,
    models::{ModelInfo, PreprocessingConfig, ResolvedModel},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend {
    /// Load the model; returns the load time, or `None` if already loaded
    ///
    /// # Errors
    /// - Model file read errors
    /// - Model parsing or session creation failures
    fn initialize(&mut self, config: &InferenceConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output that is not a 4D tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// How inputs must be prepared for this model
    fn preprocessing_config(&self) -> PreprocessingConfig;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Creates backends for a resolved model
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of `backend_type`
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model: ResolvedModel,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}
