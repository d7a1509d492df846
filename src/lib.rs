// Library exports for the manga page translation pipeline

pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        CacheError, ConfigError, DetectionError, OcrError, PipelineError, RenderingError,
        TranslationError,
    },
    types::{BBox, BatchProgress, BatchSummary, Bubble, PageOutcome, TranslationEntry},
};

pub use orchestration::{collect_pages, BatchWorker, PagePipeline, WorkerEvent};

pub use services::{
    BubbleDetector, PageRenderer, TextExtractor, TranslationMemory, Translator, FAILURE_SENTINEL,
};

pub use utils::{Metrics, MetricsSnapshot};
