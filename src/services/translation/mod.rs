pub mod google;
pub mod memory;
pub mod translator;

pub use google::{GoogleTranslateClient, RetryPolicy};
pub use memory::{TranslationMemory, REVIEWED_QUALITY};
pub use translator::{
    decode_html_entities, RemoteTranslator, TranslationOutcome, Translator, FAILURE_SENTINEL,
};
