use super::memory::TranslationMemory;
use crate::core::errors::TranslationResult;
use crate::utils::metrics::{Metrics, Stage};
use std::time::Instant;
use tracing::{debug, warn};

/// Returned in place of a translation when the remote service fails
pub const FAILURE_SENTINEL: &str = "Translation Failed";

/// Remote translation capability
pub trait RemoteTranslator: Send {
    fn translate(&self, text: &str, source: &str, target: &str) -> TranslationResult<String>;
}

/// How a translation was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// Blank input; nothing was consulted
    Empty,
    /// Reviewed entry from the translation memory
    MemoryHit(String),
    /// Fresh result from the remote service, now stored unreviewed
    Remote(String),
    /// Remote call failed; the bubble gets [`FAILURE_SENTINEL`]
    Failed { reason: String },
}

impl TranslationOutcome {
    /// Text to draw for this outcome
    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::Empty => "",
            TranslationOutcome::MemoryHit(text) | TranslationOutcome::Remote(text) => text,
            TranslationOutcome::Failed { .. } => FAILURE_SENTINEL,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TranslationOutcome::Empty => String::new(),
            TranslationOutcome::MemoryHit(text) | TranslationOutcome::Remote(text) => text,
            TranslationOutcome::Failed { .. } => FAILURE_SENTINEL.to_string(),
        }
    }
}

/// Memory-first translator with remote fallback
pub struct Translator {
    memory: TranslationMemory,
    remote: Box<dyn RemoteTranslator>,
    source_language: String,
    target_language: String,
    metrics: Metrics,
}

impl Translator {
    pub fn new(
        memory: TranslationMemory,
        remote: Box<dyn RemoteTranslator>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            memory,
            remote,
            source_language: source_language.into(),
            target_language: target_language.into(),
            metrics,
        }
    }

    pub fn memory(&self) -> &TranslationMemory {
        &self.memory
    }

    /// Translate, never failing: see [`Translator::translate_detailed`]
    pub fn translate(&self, source_text: &str) -> String {
        self.translate_detailed(source_text).into_text()
    }

    /// Resolve `source_text`:
    /// blank input short-circuits, then the memory is consulted, then the
    /// remote service. Remote results are entity-decoded and stored. A store
    /// write failure is logged and does not affect the returned text.
    pub fn translate_detailed(&self, source_text: &str) -> TranslationOutcome {
        if source_text.trim().is_empty() {
            return TranslationOutcome::Empty;
        }

        let start = Instant::now();
        let outcome = self.resolve(source_text);
        self.metrics.record_stage(Stage::Translation, start.elapsed());
        outcome
    }

    fn resolve(&self, source_text: &str) -> TranslationOutcome {
        if let Some(hit) = self.memory.lookup(source_text) {
            debug!("Memory hit for '{}'", source_text);
            self.metrics.record_memory_hit();
            return TranslationOutcome::MemoryHit(hit);
        }
        self.metrics.record_memory_miss();

        let call_start = Instant::now();
        let result = self
            .remote
            .translate(source_text, &self.source_language, &self.target_language);
        self.metrics.record_remote_call(result.is_ok(), call_start.elapsed());

        match result {
            Ok(raw) => {
                let translated = decode_html_entities(&raw);
                if let Err(e) = self.memory.add_translation(source_text, &translated) {
                    warn!("Could not store translation for '{}': {}", source_text, e);
                }
                debug!("'{}' → '{}'", source_text, translated);
                TranslationOutcome::Remote(translated)
            }
            Err(e) => {
                warn!("Translation failed for '{}': {}", source_text, e);
                TranslationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Longest reference considered, `&CounterClockwiseContourIntegral;` included
const MAX_ENTITY_LEN: usize = 40;

/// Decode HTML character references one at a time.
///
/// Named (HTML5) and numeric references are decoded; an unknown or
/// malformed reference is copied through literally and the rest of the
/// text is still decoded.
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let reference = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .filter(|&i| i > 0 && i + 2 <= MAX_ENTITY_LEN && tail[1 + i..].starts_with(';'))
            .map(|i| &tail[..i + 2]);

        match reference {
            Some(reference) => {
                match quick_xml::escape::unescape(reference) {
                    Ok(value) => decoded.push_str(&value),
                    Err(_) => decoded.push_str(reference),
                }
                rest = &tail[reference.len()..];
            }
            None => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}
