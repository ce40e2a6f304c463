//! Model cache management for downloaded models
//!
//! Models live as flat files in a per-user cache directory:
//! `<cache>/bgreplace/models/<name>.onnx`, each with a `<name>.json` sidecar
//! recording where it came from and its SHA-256.

use crate::error::{BgReplaceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the cache root
pub const CACHE_DIR_ENV: &str = "BGREPLACE_CACHE_DIR";

/// Sidecar metadata written next to each downloaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub url: String,
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the model file
    pub sha256: String,
    pub downloaded_at: DateTime<Utc>,
}

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Registry name (file stem)
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Sidecar contents, when present and readable
    pub metadata: Option<ModelMetadata>,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager for the default location
    ///
    /// - `$BGREPLACE_CACHE_DIR/models/` when the variable is set
    /// - Linux: `~/.cache/bgreplace/models/`
    /// - macOS: `~/Library/Caches/bgreplace/models/`
    /// - Windows: `%LOCALAPPDATA%/bgreplace/models/`
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::ensure_dir(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Create a cache rooted at `cache_dir` (models go to `cache_dir/models`)
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        Self::ensure_dir(&models_dir)?;
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    /// Resolve the models directory without creating it
    ///
    /// # Errors
    /// - No user cache directory on this platform and no override set
    pub fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            if !cache_override.is_empty() {
                return Ok(PathBuf::from(cache_override).join("models"));
            }
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgReplaceError::invalid_config(format!(
                    "Failed to determine cache directory. Set the {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("bgreplace")
            .join("models"))
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| BgReplaceError::file_io_error("create cache directory", dir, &e))?;
        }
        Ok(())
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the model file (may not exist)
    #[must_use]
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{name}.onnx"))
    }

    /// Path of the model's JSON sidecar (may not exist)
    #[must_use]
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{name}.json"))
    }

    /// A model counts as cached when its file exists and is not empty
    #[must_use]
    pub fn is_model_cached(&self, name: &str) -> bool {
        fs::metadata(self.model_path(name)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Read a model's sidecar, `None` if missing or unreadable
    #[must_use]
    pub fn read_metadata(&self, name: &str) -> Option<ModelMetadata> {
        let path = self.metadata_path(name);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::debug!("Ignoring unreadable metadata {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Write a model's sidecar
    ///
    /// # Errors
    /// - Serialization or file write errors
    pub fn write_metadata(&self, name: &str, metadata: &ModelMetadata) -> Result<()> {
        let path = self.metadata_path(name);
        let json = serde_json::to_string_pretty(metadata)
            .map_err(|e| BgReplaceError::internal(format!("Failed to serialize metadata: {e}")))?;
        fs::write(&path, json).map_err(|e| BgReplaceError::file_io_error("write model metadata", &path, &e))
    }

    /// Scan cache directory and return all cached models, sorted by name
    ///
    /// # Errors
    /// - Failed to read cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir)
            .map_err(|e| BgReplaceError::file_io_error("read cache directory", &self.cache_dir, &e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let is_onnx = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
            if !is_onnx || !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let metadata = self.read_metadata(&name);
            models.push(CachedModelInfo {
                name,
                path,
                size_bytes,
                metadata,
            });
        }

        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    /// Remove one cached model and its sidecar
    ///
    /// # Returns
    /// `true` if the model was found and removed
    ///
    /// # Errors
    /// - Failed to remove the files
    pub fn clear_specific_model(&self, name: &str) -> Result<bool> {
        let model_path = self.model_path(name);
        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {name}");
        fs::remove_file(&model_path)
            .map_err(|e| BgReplaceError::file_io_error("remove cached model", &model_path, &e))?;

        let metadata_path = self.metadata_path(name);
        if metadata_path.exists() {
            fs::remove_file(&metadata_path).map_err(|e| {
                BgReplaceError::file_io_error("remove model metadata", &metadata_path, &e)
            })?;
        }
        Ok(true)
    }

    /// Remove every cached model, returning the removed names
    ///
    /// # Errors
    /// - Failed to scan or remove files
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for model in self.scan_cached_models()? {
            if self.clear_specific_model(&model.name)? {
                removed.push(model.name);
            }
        }
        Ok(removed)
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
