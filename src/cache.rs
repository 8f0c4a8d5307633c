//! Model cache management for downloaded segmentation models
//!
//! Models live in an XDG-compliant cache directory, one sub-directory per
//! HuggingFace repository:
//!
//! ```text
//! ~/.cache/pilgrimage-overlay/models/
//! └── BritishWerewolf--IS-Net-Anime/
//!     └── onnx/model.onnx
//! ```

use crate::error::{OverlayError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "PILGRIMAGE_OVERLAY_CACHE_DIR";

/// Information about a cached model file
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (repository with `/` replaced by `--`)
    pub model_id: String,
    /// Path to the cached `.onnx` file
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager in the default location
    ///
    /// - Linux/macOS: `~/.cache/pilgrimage-overlay/models/`
    /// - Windows: `%LOCALAPPDATA%/pilgrimage-overlay/models/`
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        Self::at(Self::default_cache_dir()?)
    }

    /// Create a cache manager rooted at `cache_dir`
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn at(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                OverlayError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    fn default_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                OverlayError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV}."
                ))
            })?
            .join("pilgrimage-overlay")
            .join("models"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Filesystem-safe identifier for a repository
    ///
    /// ```
    /// use pilgrimage_overlay::cache::ModelCache;
    ///
    /// assert_eq!(ModelCache::repo_to_model_id("BritishWerewolf/IS-Net-Anime"), "BritishWerewolf--IS-Net-Anime");
    /// ```
    #[must_use]
    pub fn repo_to_model_id(repo: &str) -> String {
        repo.trim_matches('/').replace('/', "--")
    }

    /// Path a repository file is (or would be) cached at
    #[must_use]
    pub fn model_file_path(&self, repo: &str, file: &str) -> PathBuf {
        self.cache_dir.join(Self::repo_to_model_id(repo)).join(file)
    }

    #[must_use]
    pub fn is_cached(&self, repo: &str, file: &str) -> bool {
        self.model_file_path(repo, file).is_file()
    }

    /// List cached `.onnx` files
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            OverlayError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries.flatten() {
            let model_dir = entry.path();
            if !model_dir.is_dir() {
                continue;
            }
            let model_id = entry.file_name().to_string_lossy().to_string();
            Self::collect_onnx_files(&model_dir, &model_id, &mut models);
        }

        models.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(models)
    }

    fn collect_onnx_files(dir: &Path, model_id: &str, out: &mut Vec<CachedModelInfo>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                Self::collect_onnx_files(&path, model_id, out);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
            {
                out.push(CachedModelInfo {
                    model_id: model_id.to_string(),
                    size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
                    path,
                });
            }
        }
    }

    /// Remove a cached repository
    ///
    /// Returns `false` when nothing was cached.
    ///
    /// # Errors
    /// - Failed to remove the directory
    pub fn clear_model(&self, repo: &str) -> Result<bool> {
        let model_dir = self.cache_dir.join(Self::repo_to_model_id(repo));
        if !model_dir.exists() {
            return Ok(false);
        }
        log::info!("Removing cached model: {}", model_dir.display());
        fs::remove_dir_all(&model_dir).map_err(|e| {
            OverlayError::file_io_error("remove cached model directory", &model_dir, &e)
        })?;
        Ok(true)
    }
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS.get(unit).copied().unwrap_or("GB"))
    }
}
