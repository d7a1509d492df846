use crate::core::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Model / detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub detector_model_path: PathBuf,
    pub ocr_models_dir: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_agnostic: bool,
    pub max_detections: usize,
    pub input_size: u32,
    pub onnx_threads: usize,
}

/// Remote translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub credentials_path: Option<PathBuf>,
    pub source_language: String,
    pub target_language: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub font_path: PathBuf,
    /// The fit search starts at `default_font_size + 2`
    pub default_font_size: u32,
    pub min_font_size: u32,
    /// Total padding subtracted from each bubble's width and height
    pub text_padding: u32,
    pub inpaint_radius: f64,
}

/// Translation memory configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub db_path: PathBuf,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub detection: DetectionConfig,
    pub translation: TranslationConfig,
    pub rendering: RenderingConfig,
    pub memory: MemoryConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, map in tests, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::load(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn load<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let path = |key: &str, default: &str| -> PathBuf {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        let text = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            log_level,
            detection: DetectionConfig {
                detector_model_path: path("DETECTOR_MODEL_PATH", "models/detector.onnx"),
                ocr_models_dir: path("OCR_MODELS_DIR", "models"),
                confidence_threshold: parse_or(lookup, "CONFIDENCE_THRESHOLD", 0.15)?,
                iou_threshold: parse_or(lookup, "IOU_THRESHOLD", 0.7)?,
                class_agnostic: parse_or(lookup, "CLASS_AGNOSTIC_NMS", true)?,
                max_detections: parse_or(lookup, "MAX_DETECTIONS", 50)?,
                input_size: parse_or(lookup, "DETECTOR_INPUT_SIZE", 640)?,
                onnx_threads: parse_or(lookup, "ONNX_THREADS", num_cpus::get().max(1))?,
            },
            translation: TranslationConfig {
                credentials_path: lookup("GOOGLE_CREDENTIALS_PATH")
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
                source_language: text("SOURCE_LANGUAGE", "ja"),
                target_language: text("TARGET_LANGUAGE", "en"),
                timeout_seconds: parse_or(lookup, "TRANSLATE_TIMEOUT_SECONDS", 30)?,
                max_retries: parse_or(lookup, "TRANSLATE_MAX_RETRIES", 2)?,
                retry_backoff_ms: parse_or(lookup, "TRANSLATE_RETRY_BACKOFF_MS", 500)?,
            },
            rendering: RenderingConfig {
                font_path: path("FONT_PATH", "fonts/mangat.ttf"),
                default_font_size: parse_or(lookup, "DEFAULT_FONT_SIZE", 28)?,
                min_font_size: parse_or(lookup, "MIN_FONT_SIZE", 8)?,
                text_padding: parse_or(lookup, "TEXT_PADDING", 15)?,
                inpaint_radius: parse_or(lookup, "INPAINT_RADIUS", 5.0)?,
            },
            memory: MemoryConfig {
                db_path: path("MEMORY_DB_PATH", "translation_memory.db"),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.detection.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(self.detection.iou_threshold));
        }

        if self.detection.max_detections == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "max_detections must be > 0".to_string(),
            ));
        }

        if !(32..=4096).contains(&self.detection.input_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "input_size must be between 32 and 4096, got {}",
                self.detection.input_size
            )));
        }

        if self.rendering.min_font_size == 0
            || self.rendering.min_font_size > self.start_font_size()
        {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "min_font_size must be between 1 and {}, got {}",
                self.start_font_size(),
                self.rendering.min_font_size
            )));
        }

        if self.rendering.inpaint_radius <= 0.0 {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "inpaint_radius must be > 0, got {}",
                self.rendering.inpaint_radius
            )));
        }

        if self.translation.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.translation.source_language == self.translation.target_language {
            return Err(ConfigError::InvalidTranslationConfig(format!(
                "source and target language are both '{}'",
                self.translation.source_language
            )));
        }

        Ok(())
    }

    /// First size tried by the font fit search
    pub fn start_font_size(&self) -> u32 {
        self.rendering.default_font_size + 2
    }

    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::EnvVarError {
                key: key.to_string(),
                value: raw,
            })
        }
        _ => Ok(default),
    }
}
