// Custom error types for the page translation pipeline
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation (page path + stage)
// - Type-safe error matching
// - Source error chaining

use std::path::PathBuf;
use thiserror::Error;

/// Translation memory (SQLite) errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to open translation memory at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Translation memory query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Bubble detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detector backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

/// Text extraction errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend failed: {0:#}")]
    Backend(anyhow::Error),
}

/// Remote translation errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Credentials file not found: {0}")]
    CredentialsNotFound(PathBuf),

    #[error("Credentials file {path} is unusable: {reason}")]
    InvalidCredentials { path: PathBuf, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Translation service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Rendering errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("Font not found: {0}")]
    FontNotFound(PathBuf),

    #[error("Font loading failed for {path}: {reason}")]
    FontLoad { path: PathBuf, reason: String },

    #[error("OpenCV operation failed: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Startup failure: the pipeline is unusable until the resource is fixed
    #[error("Failed to initialize {resource}: {reason}")]
    Resource { resource: &'static str, reason: String },

    #[error("Could not read image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Could not write image {path}: {reason}")]
    ImageWrite { path: PathBuf, reason: String },

    #[error("Detection failed on {path}: {source}")]
    Detection {
        path: PathBuf,
        #[source]
        source: DetectionError,
    },

    #[error("Rendering failed on {path}: {source}")]
    Rendering {
        path: PathBuf,
        #[source]
        source: RenderingError,
    },

    #[error("Batch failed: {0}")]
    Batch(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid rendering config: {0}")]
    InvalidRenderingConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Environment variable {key} has invalid value '{value}'")]
    EnvVarError { key: String, value: String },
}

// Convenience type aliases for Results
pub type CacheResult<T> = Result<T, CacheError>;
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type OcrResult<T> = Result<T, OcrError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Attach the page path to stage-level errors
pub trait PageContext<T> {
    fn with_page(self, path: &std::path::Path) -> PipelineResult<T>;
}

impl<T> PageContext<T> for DetectionResult<T> {
    fn with_page(self, path: &std::path::Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Detection {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<T> PageContext<T> for RenderingResult<T> {
    fn with_page(self, path: &std::path::Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Rendering {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PipelineError {
    /// Wrap a startup failure
    pub fn resource(resource: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Resource {
            resource,
            reason: err.to_string(),
        }
    }

    /// Short name of the stage that failed, for progress reporting
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Resource { .. } => "startup",
            PipelineError::ImageLoad { .. } => "load",
            PipelineError::ImageWrite { .. } => "write",
            PipelineError::Detection { .. } => "detection",
            PipelineError::Rendering { .. } => "rendering",
            PipelineError::Batch(_) => "batch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_page_context_keeps_path_and_stage() {
        let result: DetectionResult<()> =
            Err(DetectionError::InvalidImageSize { width: 0, height: 10 });
        let err = result.with_page(Path::new("pages/001.png")).unwrap_err();

        assert_eq!(err.stage(), "detection");
        let message = err.to_string();
        assert!(message.contains("pages/001.png"));
        assert!(message.contains("0x10"));
    }
}
