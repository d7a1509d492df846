// Page Pipeline: detect → OCR → translate → render for one page, and the
// sequential batch driver on top of it

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Instant;
use image::{DynamicImage, ImageReader};
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::errors::{PageContext, PipelineError, PipelineResult};
use crate::core::types::{BatchProgress, BatchSummary, Bubble, PageOutcome};
use crate::services::detection::{BubbleDetector, OnnxDetector};
use crate::services::ocr::{OnnxOcr, TextExtractor};
use crate::services::rendering::PageRenderer;
use crate::services::translation::{GoogleTranslateClient, TranslationMemory, Translator};
use crate::utils::metrics::{Metrics, Stage};
use crate::utils::natural_order::natural_path_cmp;

const PAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Everything needed to turn input pages into translated pages.
///
/// Owns its backends and runs on a single thread; nothing is shared between
/// pages except the translation memory.
pub struct PagePipeline {
    detector: BubbleDetector,
    extractor: TextExtractor,
    translator: Translator,
    renderer: PageRenderer,
    metrics: Metrics,
}

impl PagePipeline {
    /// Build the production pipeline.
    ///
    /// Every resource (models, memory store, credentials, font) is acquired
    /// here; any failure is fatal and reported as [`PipelineError::Resource`].
    pub fn new(config: &Config, credentials: Option<&Path>, metrics: Metrics) -> PipelineResult<Self> {
        info!("Initializing services...");

        let detector = OnnxDetector::new(&config.detection)
            .map_err(|e| PipelineError::resource("detector model", format!("{:#}", e)))?;
        let ocr = OnnxOcr::new(&config.detection.ocr_models_dir, config.detection.onnx_threads)
            .map_err(|e| PipelineError::resource("OCR model", format!("{:#}", e)))?;

        let memory = TranslationMemory::open(&config.memory.db_path)
            .map_err(|e| PipelineError::resource("translation memory", e))?;

        let credentials_path = credentials
            .map(Path::to_path_buf)
            .or_else(|| config.translation.credentials_path.clone())
            .ok_or_else(|| {
                PipelineError::resource(
                    "translation credentials",
                    "no credentials file given (set GOOGLE_CREDENTIALS_PATH or pass --credentials)",
                )
            })?;
        let remote = GoogleTranslateClient::new(&credentials_path, &config.translation)
            .map_err(|e| PipelineError::resource("translation credentials", e))?;

        let renderer = PageRenderer::from_config(&config.rendering)
            .map_err(|e| PipelineError::resource("font", e))?;

        let translator = Translator::new(
            memory,
            Box::new(remote),
            config.translation.source_language.clone(),
            config.translation.target_language.clone(),
            metrics.clone(),
        );

        info!(
            "✓ Ready ({} → {}, font search {}..={}px)",
            config.translation.source_language,
            config.translation.target_language,
            config.rendering.min_font_size,
            config.start_font_size()
        );

        Ok(Self::with_backends(
            BubbleDetector::new(Box::new(detector), (&config.detection).into()),
            TextExtractor::new(Box::new(ocr)),
            translator,
            renderer,
            metrics,
        ))
    }

    /// Assemble a pipeline from already-built components
    pub fn with_backends(
        detector: BubbleDetector,
        extractor: TextExtractor,
        translator: Translator,
        renderer: PageRenderer,
        metrics: Metrics,
    ) -> Self {
        Self {
            detector,
            extractor,
            translator,
            renderer,
            metrics,
        }
    }

    pub fn memory(&self) -> &TranslationMemory {
        self.translator.memory()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Translate one page from `input` into `output`.
    ///
    /// A page without bubbles is copied byte for byte. Per-bubble OCR and
    /// translation problems never fail the page.
    pub fn process_page(&mut self, input: &Path, output: &Path) -> PipelineResult<PageOutcome> {
        let result = self.process_page_inner(input, output);
        match &result {
            Ok(PageOutcome::Translated { bubbles }) => self.metrics.record_page_translated(*bubbles),
            Ok(PageOutcome::CopiedUnchanged) => self.metrics.record_page_copied(),
            Err(_) => self.metrics.record_page_failed(),
        }
        result
    }

    fn process_page_inner(&mut self, input: &Path, output: &Path) -> PipelineResult<PageOutcome> {
        let page_start = Instant::now();

        let image = load_page(input).map_err(|source| PipelineError::ImageLoad {
            path: input.to_path_buf(),
            source,
        })?;

        let start = Instant::now();
        let boxes = self.detector.detect(&image).with_page(input)?;
        self.metrics.record_stage(Stage::Detection, start.elapsed());

        ensure_parent_dir(output)?;

        if boxes.is_empty() {
            std::fs::copy(input, output).map_err(|e| PipelineError::ImageWrite {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })?;
            debug!("No bubbles on {}, copied unchanged", input.display());
            return Ok(PageOutcome::CopiedUnchanged);
        }

        // Sequential, in detection order
        let mut bubbles = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let start = Instant::now();
            let original_text = self.extractor.extract(&image, bbox);
            self.metrics.record_stage(Stage::Recognition, start.elapsed());

            let translated_text = self.translator.translate(&original_text);
            debug!("{:?}: '{}' → '{}'", bbox, original_text, translated_text);

            bubbles.push(Bubble {
                bbox,
                original_text,
                translated_text,
            });
        }

        let start = Instant::now();
        let rendered = self.renderer.render(&image.to_rgb8(), &bubbles).with_page(input)?;
        self.metrics.record_stage(Stage::Rendering, start.elapsed());

        rendered.save(output).map_err(|e| PipelineError::ImageWrite {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!(
            "✓ {} ({} bubbles) in {:.2}s",
            input.display(),
            bubbles.len(),
            page_start.elapsed().as_secs_f64()
        );
        Ok(PageOutcome::Translated {
            bubbles: bubbles.len(),
        })
    }

    /// Process `pages` in the given order into `output_dir`, keeping file names.
    ///
    /// `is_cancelled` is checked before each page; a page already started
    /// always finishes. Page failures are reported through `on_log` and the
    /// batch moves on. Progress is reported after every page.
    pub fn process_batch<P, L, C>(
        &mut self,
        pages: &[PathBuf],
        output_dir: &Path,
        mut on_progress: P,
        mut on_log: L,
        is_cancelled: C,
    ) -> PipelineResult<BatchSummary>
    where
        P: FnMut(BatchProgress),
        L: FnMut(&str),
        C: Fn() -> bool,
    {
        std::fs::create_dir_all(output_dir).map_err(|e| {
            PipelineError::Batch(format!(
                "cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let total = pages.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        let batch_start = Instant::now();
        on_log(&format!("Processing {} pages", total));

        for (index, page) in pages.iter().enumerate() {
            if is_cancelled() {
                summary.cancelled = true;
                on_log(&format!("Cancelled after {} of {} pages", index, total));
                break;
            }

            let file_name = page.file_name().unwrap_or_else(|| OsStr::new("page.png"));
            let name = file_name.to_string_lossy();
            on_log(&format!("[{}/{}] {}", index + 1, total, name));

            match self.process_page(page, &output_dir.join(file_name)) {
                Ok(PageOutcome::Translated { bubbles }) => {
                    summary.translated += 1;
                    on_log(&format!("  ✓ {} bubbles translated", bubbles));
                }
                Ok(PageOutcome::CopiedUnchanged) => {
                    summary.copied += 1;
                    on_log("  No bubbles found, copied unchanged");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("{} failed during {}: {}", name, e.stage(), e);
                    on_log(&format!("  ✗ {} failed during {}: {}", name, e.stage(), e));
                }
            }

            let memory_entries = self.memory().count_entries().unwrap_or_else(|e| {
                warn!("Could not count translation memory entries: {}", e);
                0
            });
            self.metrics.update_memory_size(memory_entries);
            on_log(&format!("  TM has {} unique entries", memory_entries));

            let completed = index + 1;
            on_progress(BatchProgress {
                completed,
                total,
                fraction: completed as f32 / total as f32,
                memory_entries,
            });
        }

        info!(
            "Batch done in {:.1}s: {} translated, {} copied, {} failed{}",
            batch_start.elapsed().as_secs_f64(),
            summary.translated,
            summary.copied,
            summary.failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }
}

/// Page images in `dir` (png/jpg/jpeg, any case), in natural file-name order
pub fn collect_pages(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PipelineError::Batch(format!("cannot read input directory {}: {}", dir.display(), e))
    })?;

    let mut pages: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_page_image(path))
        .collect();
    pages.sort_by(|a, b| natural_path_cmp(a, b));

    debug!("Found {} pages in {}", pages.len(), dir.display());
    Ok(pages)
}

/// Decode a page by its content, not its extension
fn load_page(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn ensure_parent_dir(output: &Path) -> PipelineResult<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::ImageWrite {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })
        }
        _ => Ok(()),
    }
}
