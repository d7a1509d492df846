pub mod detection;
pub mod font_manager;
pub mod ocr;
pub mod onnx_builder;
pub mod rendering;
pub mod translation;

pub use detection::{BubbleDetector, DetectParams, Detection, DetectorBackend, OnnxDetector};
pub use font_manager::FontFace;
pub use ocr::{OcrBackend, OnnxOcr, TextExtractor};
pub use rendering::{CosmicTextPainter, PageRenderer, TextPainter, TextStyle};
pub use translation::{
    GoogleTranslateClient, RemoteTranslator, TranslationMemory, TranslationOutcome, Translator,
    FAILURE_SENTINEL,
};
