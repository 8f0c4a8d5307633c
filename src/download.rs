//! Model downloading from `HuggingFace` repositories
//!
//! Streams a single ONNX file into a temporary file next to its final cache
//! location and renames it into place once complete, so a partially written
//! model is never picked up by [`crate::models::ModelManager`].

use crate::cache::ModelCache;
use crate::error::{OverlayError, Result};
use crate::models::ModelSource;
use crate::tracing_config::spans;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Hex encoded SHA-256 of `data`
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
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

/// Downloads segmentation models into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader using the default cache location
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| OverlayError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, cache })
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Ensure the model named by `source` is available locally
    ///
    /// Local paths are returned as-is. `HuggingFace` sources are downloaded
    /// unless already cached.
    ///
    /// # Errors
    /// - Local model file missing
    /// - Network errors during download
    /// - File system errors while caching
    pub async fn ensure_model(&self, source: &ModelSource, show_progress: bool) -> Result<PathBuf> {
        match source {
            ModelSource::Path(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(OverlayError::model_load(format!(
                        "Model file not found: {}",
                        path.display()
                    )))
                }
            },
            ModelSource::HuggingFace { repo, file } => {
                let final_path = self.cache.model_file_path(repo, file);
                if final_path.is_file() {
                    log::info!("Model already cached: {}", final_path.display());
                    return Ok(final_path);
                }
                let url = source.download_url().ok_or_else(|| {
                    OverlayError::internal("HuggingFace source without a download URL")
                })?;
                self.download_to(&url, &final_path, show_progress).await?;
                Ok(final_path)
            },
        }
    }

    async fn download_to(&self, url: &str, final_path: &Path, show_progress: bool) -> Result<()> {
        log::info!("Downloading model from: {url}");

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| OverlayError::file_io_error("create directory", parent, &e))?;
        }
        let temp_path = final_path.with_extension("onnx.part");

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };

        let result = self
            .download_file(url, &temp_path, &progress)
            .instrument(spans::download(url, final_path))
            .await;
        match result {
            Ok(downloaded) => {
                fs::rename(&temp_path, final_path).map_err(|e| {
                    OverlayError::file_io_error("move downloaded model to cache", final_path, &e)
                })?;
                progress.finish_with_message(format!(
                    "Downloaded {}",
                    crate::cache::format_size(downloaded)
                ));
                log::info!("Cached model at {}", final_path.display());
                Ok(())
            },
            Err(e) => {
                if temp_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&temp_path) {
                        log::warn!("Failed to clean up partial download: {cleanup_err}");
                    }
                }
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream `url` into `local_path`, returning the number of bytes written
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OverlayError::network_error(&format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(OverlayError::network_error(
                url,
                format!("HTTP error {}", response.status()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| OverlayError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| OverlayError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| OverlayError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| OverlayError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok(downloaded)
    }

    /// Verify a file against an expected SHA-256
    ///
    /// Returns `true` when no hash is given.
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            OverlayError::file_io_error("read file for verification", file_path, &e)
        })?;
        let actual = sha256_hex(&contents);

        if actual.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {expected}, got {actual}",
                file_path.display()
            );
            Ok(false)
        }
    }
}
