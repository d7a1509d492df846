pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    CacheError, ConfigError, DetectionError, OcrError, PipelineError, RenderingError,
    TranslationError,
};
pub use types::{BBox, BatchProgress, BatchSummary, Bubble, PageOutcome, TranslationEntry};
