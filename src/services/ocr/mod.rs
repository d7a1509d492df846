// OCR Service Module - pulls source-language text out of bubble crops
// CPU-friendly CTC recognition model for Japanese manga text

use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::BBox;
use crate::services::onnx_builder;
use crate::utils::image_ops::crop_to_bbox;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// OCR model input dimensions
const TARGET_HEIGHT: u32 = 60;
const MIN_WIDTH: u32 = 10;

/// OCR capability: read whatever text is in the given region
pub trait OcrBackend: Send {
    fn read(&self, region: &DynamicImage) -> Result<String>;
}

/// Crops bubbles out of a page and hands them to the OCR backend.
///
/// Never fails: an empty crop or an unreadable region yields "".
pub struct TextExtractor {
    backend: Box<dyn OcrBackend>,
}

impl TextExtractor {
    pub fn new(backend: Box<dyn OcrBackend>) -> Self {
        Self { backend }
    }

    pub fn extract(&self, image: &DynamicImage, bbox: BBox) -> String {
        self.try_extract(image, bbox).unwrap_or_else(|e| {
            warn!("OCR failed for {:?}: {}", bbox, e);
            String::new()
        })
    }

    /// Like [`TextExtractor::extract`] but surfaces backend failures
    pub fn try_extract(&self, image: &DynamicImage, bbox: BBox) -> OcrResult<String> {
        let Some(region) = crop_to_bbox(image, bbox) else {
            debug!("Empty crop for {:?}, skipping OCR", bbox);
            return Ok(String::new());
        };

        // The recognizer works on 3-channel input
        let region = DynamicImage::ImageRgb8(region.to_rgb8());

        let text = self.backend.read(&region).map_err(OcrError::Backend)?;
        Ok(text.trim().to_string())
    }
}

/// CTC recognition model plus its index → character vocabulary
pub struct OnnxOcr {
    session: Mutex<Session>,
    vocab: HashMap<usize, String>,
    blank_index: usize,
}

impl OnnxOcr {
    /// Load `ocr/ocr.onnx` and `ocr/cjk_vocab.txt` from `models_dir`
    pub fn new(models_dir: &Path, threads: usize) -> Result<Self> {
        let model_path = models_dir.join("ocr").join("ocr.onnx");
        let vocab_path = models_dir.join("ocr").join("cjk_vocab.txt");

        if !vocab_path.exists() {
            anyhow::bail!("OCR vocabulary not found at: {}", vocab_path.display());
        }

        info!("Loading OCR model from disk: {}", model_path.display());
        let session = onnx_builder::build_session(&model_path, threads)?;

        let content =
            std::fs::read_to_string(&vocab_path).context("Failed to read vocabulary file")?;
        let (vocab, blank) = parse_vocabulary(&content);
        // Without an explicit <blank> entry the blank class follows the last character
        let blank_index = blank.unwrap_or_else(|| vocab.keys().max().map_or(0, |&max| max + 1));

        info!(
            "✓ OCR initialized: vocab_size={}, blank_index={}",
            vocab.len(),
            blank_index
        );

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            blank_index,
        })
    }

    /// Resize to the model height keeping aspect ratio, normalize to [0, 1],
    /// lay out as `[1, 3, H, W]`. Returns the tensor and its sequence length.
    fn preprocess_image(image: &DynamicImage) -> (Array4<f32>, i32) {
        let (w, h) = image.dimensions();

        let scale = TARGET_HEIGHT as f32 / h.max(1) as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let rgb = image
            .resize_exact(new_w, TARGET_HEIGHT, image::imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        // seq_length = width / 4 (LSTM stride)
        (tensor, (new_w / 4) as i32)
    }
}

impl OcrBackend for OnnxOcr {
    fn read(&self, region: &DynamicImage) -> Result<String> {
        let (tensor, seq_length) = Self::preprocess_image(region);

        let data_value = Value::from_array(tensor)?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length]))?;

        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "data" => data_value,
                "seq_lengths" => seq_lengths_value
            ])?;

            let first_key = outputs.keys().next().context("No outputs from OCR model")?;
            let (shape, logits) = outputs[first_key].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits.to_vec())
        };

        let (seq_len, vocab_size) = match dims.as_slice() {
            // [S, 1, V]
            [s, 1, v] => (*s, *v),
            // [1, S, V]
            [_, s, v] => (*s, *v),
            [s, v] => (*s, *v),
            _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
        };

        let text = ctc_greedy_decode(&logits, seq_len, vocab_size, self.blank_index, &self.vocab);
        debug!("OCR result: '{}'", text);
        Ok(text)
    }
}

/// Parse `index\tchar` lines; `<space>` maps to " ", `<blank>` marks the CTC blank
fn parse_vocabulary(content: &str) -> (HashMap<usize, String>, Option<usize>) {
    let mut vocab: HashMap<usize, String> = (32u8..127)
        .map(|b| (b as usize, (b as char).to_string()))
        .collect();
    vocab.insert(0, " ".to_string());
    let mut blank = None;

    for line in content.lines() {
        let Some((idx_str, char_str)) = line.split_once('\t') else {
            continue;
        };
        let Ok(idx) = idx_str.trim().parse::<usize>() else {
            continue;
        };
        match char_str {
            "<blank>" => blank = Some(idx),
            "<space>" => {
                vocab.insert(idx, " ".to_string());
            }
            ch => {
                vocab.insert(idx, ch.to_string());
            }
        }
    }

    (vocab, blank)
}

/// Best class per timestep, collapse repeats, drop blanks
fn ctc_greedy_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    blank_index: usize,
    vocab: &HashMap<usize, String>,
) -> String {
    let mut text = String::new();
    let mut prev_idx: Option<usize> = None;

    for step in logits.chunks_exact(vocab_size.max(1)).take(seq_len) {
        let best_idx = step
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0;

        if best_idx != blank_index && Some(best_idx) != prev_idx {
            text.push_str(vocab.get(&best_idx).map(String::as_str).unwrap_or("?"));
        }
        prev_idx = Some(best_idx);
    }

    text
}
