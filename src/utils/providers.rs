//! Execution provider strings (`backend:provider`) and availability listing

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{BgReplaceError, Result},
};

/// Information about an execution provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse `backend:provider` (e.g. `onnx:auto`, `tract:cpu`) or a bare backend name
    ///
    /// # Examples
    /// ```rust
    /// use bgreplace::{BackendType, ExecutionProvider};
    /// use bgreplace::utils::ExecutionProviderManager;
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda").unwrap();
    /// assert_eq!(backend, BackendType::Onnx);
    /// assert_eq!(provider, ExecutionProvider::Cuda);
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_lowercase();
        let Some((backend, provider)) = normalized.split_once(':') else {
            return match normalized.as_str() {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(BgReplaceError::invalid_config(format!(
                    "Invalid execution provider '{provider_str}'. Use backend:provider (e.g. onnx:auto, tract:cpu)"
                ))),
            };
        };

        match (backend, provider) {
            ("onnx", "auto") => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", "cpu") => Ok((BackendType::Onnx, ExecutionProvider::Cpu)),
            ("onnx", "cuda") => Ok((BackendType::Onnx, ExecutionProvider::Cuda)),
            ("onnx", "coreml") => Ok((BackendType::Onnx, ExecutionProvider::CoreMl)),
            ("onnx", other) => Err(BgReplaceError::invalid_config(format!(
                "Unknown ONNX provider: {other}. Supported: auto, cpu, cuda, coreml"
            ))),
            ("tract", "cpu") => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", other) => Err(BgReplaceError::invalid_config(format!(
                "Unknown Tract provider: {other}. Tract only supports 'cpu'"
            ))),
            (other, _) => Err(BgReplaceError::invalid_config(format!(
                "Unknown backend: {other}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// Every provider combination with its availability in this build and on this machine
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        let onnx: Vec<(String, bool)> = crate::backends::OnnxBackend::list_providers()
            .into_iter()
            .map(|(name, available, _)| (name.to_lowercase(), available))
            .collect();
        #[cfg(not(feature = "onnx"))]
        let onnx: Vec<(String, bool)> = Vec::new();

        let onnx_available =
            |name: &str| onnx.iter().any(|(n, available)| n == name && *available);
        let suffix = if cfg!(feature = "onnx") { "" } else { " (feature disabled)" };

        let onnx_entries = [
            (ExecutionProvider::Auto, onnx_available("cpu"), "ONNX Runtime with auto-selected provider"),
            (ExecutionProvider::Cpu, onnx_available("cpu"), "ONNX Runtime CPU execution"),
            (ExecutionProvider::Cuda, onnx_available("cuda"), "ONNX Runtime CUDA GPU acceleration"),
            (ExecutionProvider::CoreMl, onnx_available("coreml"), "ONNX Runtime CoreML (Apple Silicon) acceleration"),
        ];
        for (provider, available, description) in onnx_entries {
            providers.push(ProviderInfo {
                name: Self::provider_to_string(BackendType::Onnx, provider),
                backend_type: BackendType::Onnx,
                execution_provider: provider,
                available,
                description: format!("{description}{suffix}"),
            });
        }

        #[cfg(feature = "tract")]
        for (name, available, description) in crate::backends::TractBackend::list_providers() {
            providers.push(ProviderInfo {
                name: format!("tract:{}", name.to_lowercase()),
                backend_type: BackendType::Tract,
                execution_provider: ExecutionProvider::Cpu,
                available,
                description,
            });
        }
        #[cfg(not(feature = "tract"))]
        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: false,
            description: "Pure Rust CPU inference via Tract (feature disabled)".to_string(),
        });

        providers
    }

    /// Inverse of [`Self::parse_provider_string`]
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}
