//! Model downloading with progress reporting and atomic cache writes

use crate::{
    cache::{ModelCache, ModelMetadata},
    error::{BgReplaceError, Result},
    models::ModelDescriptor,
};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

impl ModelDownloader {
    /// Create a downloader for the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader that writes into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // 5 minute timeout
            .build()
            .map_err(|e| BgReplaceError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure `model` is in the cache, downloading it if needed
    ///
    /// Returns the path of the cached model file.
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - File system errors while writing the cache
    pub async fn ensure_model(&self, model: &ModelDescriptor, show_progress: bool) -> Result<PathBuf> {
        let final_path = self.cache.model_path(model.name);
        if self.cached_and_intact(model.name)? {
            log::debug!("Model already cached: {}", model.name);
            return Ok(final_path);
        }

        let url = model.url();
        log::info!("Downloading model {} from {}", model.name, url);

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", model.name));

        match self.download_to_cache(&url, &final_path, &progress).await {
            Ok((size_bytes, sha256)) => {
                let metadata = ModelMetadata {
                    url,
                    size_bytes,
                    sha256,
                    downloaded_at: chrono::Utc::now(),
                };
                self.cache.write_metadata(model.name, &metadata)?;
                if !self.verify_file_integrity(model.name)? {
                    self.cache.clear_specific_model(model.name)?;
                    progress.finish_with_message("❌ Checksum mismatch".to_string());
                    return Err(BgReplaceError::model(format!(
                        "Downloaded model {} does not match its checksum",
                        model.name
                    )));
                }
                progress.finish_with_message(format!("✅ Downloaded {}", model.name));
                log::info!(
                    "Successfully downloaded model: {} ({})",
                    model.name,
                    crate::cache::format_size(size_bytes)
                );
                Ok(final_path)
            },
            Err(e) => {
                progress.finish_with_message("❌ Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream `url` into a temp file beside `final_path`, then persist it
    ///
    /// Returns the byte count and SHA-256 of what was written.
    async fn download_to_cache(
        &self,
        url: &str,
        final_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<(u64, String)> {
        let dir = final_path
            .parent()
            .ok_or_else(|| BgReplaceError::internal("Model path has no parent directory"))?;
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| BgReplaceError::file_io_error("create temp file", dir, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgReplaceError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BgReplaceError::network_error(
                format!("HTTP error {} for {}", response.status(), url),
                std::io::Error::new(std::io::ErrorKind::Other, "HTTP error"),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192]; // 8KB buffer

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgReplaceError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            staged
                .write_all(chunk)
                .map_err(|e| BgReplaceError::file_io_error("write to file", staged.path(), &e))?;
            hasher.update(chunk);

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        staged
            .flush()
            .map_err(|e| BgReplaceError::file_io_error("flush file", staged.path(), &e))?;

        if downloaded == 0 {
            return Err(BgReplaceError::network_error(
                format!("Empty response body for {url}"),
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no data"),
            ));
        }

        staged
            .persist(final_path)
            .map_err(|e| BgReplaceError::file_io_error("move downloaded model to cache", final_path, &e.error))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, final_path.display());
        Ok((downloaded, format!("{:x}", hasher.finalize())))
    }

    /// Whether `name` is cached with a matching checksum
    ///
    /// A cached file that fails verification is removed so it can be fetched again.
    ///
    /// # Errors
    /// - File read or removal errors
    pub fn cached_and_intact(&self, name: &str) -> Result<bool> {
        if !self.cache.is_model_cached(name) {
            return Ok(false);
        }
        if self.verify_file_integrity(name)? {
            return Ok(true);
        }
        log::warn!("Cached model {name} is corrupt, removing it");
        self.cache.clear_specific_model(name)?;
        Ok(false)
    }

    /// Compare a cached model file against its recorded SHA-256
    ///
    /// Returns `true` when no sidecar exists to compare against.
    ///
    /// # Errors
    /// - File read errors
    pub fn verify_file_integrity(&self, name: &str) -> Result<bool> {
        let Some(metadata) = self.cache.read_metadata(name) else {
            return Ok(true);
        };

        let path = self.cache.model_path(name);
        let actual_hash = sha256_file(&path)?;
        if actual_hash == metadata.sha256 {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                path.display(),
                metadata.sha256,
                actual_hash
            );
            Ok(false)
        }
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Hex SHA-256 of a file's contents
///
/// # Errors
/// - File read errors
pub fn sha256_file(path: &Path) -> Result<String> {
    let contents = fs::read(path)
        .map_err(|e| BgReplaceError::file_io_error("read file for verification", path, &e))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn downloader() -> (TempDir, ModelDownloader) {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        (temp_dir, ModelDownloader::with_cache(cache).unwrap())
    }

    #[test]
    fn test_sha256_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sha256_file(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_verify_file_integrity() {
        let (_temp_dir, downloader) = downloader();
        let cache = downloader.cache();
        fs::write(cache.model_path("u2net"), b"abc").unwrap();

        // No sidecar: nothing to compare against
        assert!(downloader.verify_file_integrity("u2net").unwrap());

        let mut metadata = ModelMetadata {
            url: "https://example.com/u2net.onnx".into(),
            size_bytes: 3,
            sha256: sha256_file(&cache.model_path("u2net")).unwrap(),
            downloaded_at: Utc::now(),
        };
        cache.write_metadata("u2net", &metadata).unwrap();
        assert!(downloader.verify_file_integrity("u2net").unwrap());

        metadata.sha256 = "0".repeat(64);
        cache.write_metadata("u2net", &metadata).unwrap();
        assert!(!downloader.verify_file_integrity("u2net").unwrap());
    }

    #[test]
    fn test_corrupt_cached_model_is_removed() {
        let (_temp_dir, downloader) = downloader();
        let cache = downloader.cache();
        assert!(!downloader.cached_and_intact("u2net").unwrap());

        fs::write(cache.model_path("u2net"), b"weights").unwrap();
        let metadata = ModelMetadata {
            url: "https://example.com/u2net.onnx".into(),
            size_bytes: 7,
            sha256: sha256_file(&cache.model_path("u2net")).unwrap(),
            downloaded_at: Utc::now(),
        };
        cache.write_metadata("u2net", &metadata).unwrap();
        assert!(downloader.cached_and_intact("u2net").unwrap());

        // Truncated on disk after the checksum was recorded
        fs::write(cache.model_path("u2net"), b"wei").unwrap();
        assert!(!downloader.cached_and_intact("u2net").unwrap());
        assert!(!cache.model_path("u2net").exists());
        assert!(!cache.metadata_path("u2net").exists());
    }

    #[tokio::test]
    async fn test_ensure_model_skips_cached_files() {
        let (_temp_dir, downloader) = downloader();
        let model = crate::models::default_model();
        fs::write(downloader.cache().model_path(model.name), b"weights").unwrap();

        let path = downloader.ensure_model(model, false).await.unwrap();
        assert_eq!(path, downloader.cache().model_path(model.name));
        assert_eq!(fs::read(path).unwrap(), b"weights");
    }

    #[test]
    fn test_progress_indicator_no_op() {
        let progress = ProgressIndicator::NoOp;
        progress.set_length(10);
        progress.set_position(5);
        progress.set_message("msg".to_string());
        progress.finish_with_message("done".to_string());
    }
}
