//! Segmentation model sources and resolution to an on-disk ONNX file

use crate::cache::ModelCache;
use crate::error::{OverlayError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HuggingFace repository hosting the anime-tuned IS-Net export
pub const DEFAULT_MODEL_REPO: &str = "BritishWerewolf/IS-Net-Anime";

/// ONNX file inside [`DEFAULT_MODEL_REPO`]
pub const DEFAULT_MODEL_FILE: &str = "onnx/model.onnx";

/// Where a segmentation model comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// A local ONNX file
    Path(PathBuf),
    /// A file inside a HuggingFace repository, cached after download
    HuggingFace {
        /// Repository in `owner/name` form
        repo: String,
        /// File path inside the repository
        file: String,
    },
}

impl ModelSource {
    /// Human readable name for logs
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => format!("file:{}", path.display()),
            Self::HuggingFace { repo, file } => format!("hf:{repo}/{file}"),
        }
    }

    /// Download URL for HuggingFace sources
    #[must_use]
    pub fn download_url(&self) -> Option<String> {
        match self {
            Self::Path(_) => None,
            Self::HuggingFace { repo, file } => Some(format!(
                "https://huggingface.co/{repo}/resolve/main/{file}"
            )),
        }
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::HuggingFace {
            repo: DEFAULT_MODEL_REPO.to_string(),
            file: DEFAULT_MODEL_FILE.to_string(),
        }
    }
}

/// Complete model specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Expected SHA-256 of the model file, verified on load when present
    pub sha256: Option<String>,
}

impl ModelSpec {
    /// Spec for a local ONNX file
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::Path(path.into()),
            sha256: None,
        }
    }

    /// Parse a CLI style model argument: an existing path or `owner/repo[:file]`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let path = PathBuf::from(value);
        if path.exists() {
            return Self::from_path(path);
        }

        let (repo, file) = match value.split_once(':') {
            Some((repo, file)) => (repo.to_string(), file.to_string()),
            None if value.ends_with(".onnx") => return Self::from_path(path),
            None => (value.to_string(), DEFAULT_MODEL_FILE.to_string()),
        };
        Self {
            source: ModelSource::HuggingFace { repo, file },
            sha256: None,
        }
    }
}

/// Resolves a [`ModelSpec`] to model bytes for the backends
#[derive(Debug, Clone)]
pub struct ModelManager {
    spec: ModelSpec,
    cache_dir: Option<PathBuf>,
}

impl ModelManager {
    #[must_use]
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            cache_dir: None,
        }
    }

    /// Use a specific cache directory instead of the XDG default
    #[must_use]
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn cache(&self) -> Result<ModelCache> {
        match &self.cache_dir {
            Some(dir) => ModelCache::at(dir.clone()),
            None => ModelCache::new(),
        }
    }

    /// Path of the model file on disk
    ///
    /// # Errors
    /// - Local file does not exist
    /// - HuggingFace model has not been downloaded yet
    pub fn model_path(&self) -> Result<PathBuf> {
        match &self.spec.source {
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
                let cache = self.cache()?;
                let path = cache.model_file_path(repo, file);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(OverlayError::model_load(format!(
                        "Model '{repo}' is not cached. Download it first (download-model)."
                    )))
                }
            },
        }
    }

    /// Read the model bytes, verifying the checksum if one is configured
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Checksum mismatch
    pub fn load_model(&self) -> Result<Vec<u8>> {
        let path = self.model_path()?;
        let data = std::fs::read(&path)
            .map_err(|e| OverlayError::model_load(format!("{}: {e}", path.display())))?;

        if let Some(expected) = &self.spec.sha256 {
            let actual = crate::download::sha256_hex(&data);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(OverlayError::model_load(format!(
                    "Checksum mismatch for {}: expected {expected}, got {actual}",
                    path.display()
                )));
            }
        }

        log::debug!("Loaded model {} ({} bytes)", path.display(), data.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_source_points_at_anime_isnet() {
        let spec = ModelSpec::default();
        assert_eq!(
            spec.source.download_url().unwrap(),
            "https://huggingface.co/BritishWerewolf/IS-Net-Anime/resolve/main/onnx/model.onnx"
        );
    }

    #[test]
    fn test_parse_model_argument() {
        let spec = ModelSpec::parse("owner/repo:onnx/model_fp16.onnx");
        assert_eq!(
            spec.source,
            ModelSource::HuggingFace {
                repo: "owner/repo".into(),
                file: "onnx/model_fp16.onnx".into()
            }
        );

        let spec = ModelSpec::parse("owner/repo");
        assert!(matches!(
            spec.source,
            ModelSource::HuggingFace { ref file, .. } if file == DEFAULT_MODEL_FILE
        ));

        let spec = ModelSpec::parse("./models/isnet.onnx");
        assert!(matches!(spec.source, ModelSource::Path(_)));
    }

    #[test]
    fn test_repo_file_argument_is_not_a_local_path() {
        let spec = ModelSpec::parse("BritishWerewolf/IS-Net-Anime:onnx/model_quantized.onnx");
        assert_eq!(
            spec.source,
            ModelSource::HuggingFace {
                repo: "BritishWerewolf/IS-Net-Anime".into(),
                file: "onnx/model_quantized.onnx".into()
            }
        );

        let temp = tempfile::TempDir::new().unwrap();
        let local = temp.path().join("model.onnx");
        std::fs::write(&local, b"onnx").unwrap();
        let spec = ModelSpec::parse(&local.to_string_lossy());
        assert_eq!(spec.source, ModelSource::Path(local));
    }

    #[test]
    fn test_missing_local_model_is_model_load_error() {
        let manager = ModelManager::new(ModelSpec::from_path("/nonexistent/model.onnx"));
        let err = manager.model_path().unwrap_err();
        assert!(matches!(err, OverlayError::ModelLoad(_)));
    }

    #[test]
    fn test_uncached_hf_model_is_model_load_error() {
        let temp = TempDir::new().unwrap();
        let manager = ModelManager::new(ModelSpec::default()).with_cache_dir(temp.path());
        let err = manager.model_path().unwrap_err();
        assert!(err.to_string().contains("not cached"));
    }

    #[test]
    fn test_checksum_verification() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.onnx");
        std::fs::write(&path, b"fake model").unwrap();

        let mut spec = ModelSpec::from_path(&path);
        spec.sha256 = Some(crate::download::sha256_hex(b"fake model"));
        assert_eq!(ModelManager::new(spec.clone()).load_model().unwrap(), b"fake model");

        spec.sha256 = Some("00".repeat(32));
        assert!(ModelManager::new(spec).load_model().is_err());
    }
}
