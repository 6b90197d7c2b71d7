pub mod cache;
pub mod client;

pub use cache::TranslationCache;
pub use client::{HttpTranslator, TranslateError, Translator};
