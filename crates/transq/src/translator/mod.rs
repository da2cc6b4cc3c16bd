//! The translation provider capability.
//!
//! Provider clients live outside this crate; the queue only sees the
//! [`Translator`] trait and picks one through the [`TranslatorRegistry`].

pub mod registry;

use thiserror::Error;

pub use registry::TranslatorRegistry;

/// One call to a translation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    /// What is being translated, e.g. `post:title`.
    pub domain_hint: Option<&'a str>,
}

/// Provider failure for a single request. Always localized to one job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Provider unreachable: {0}")]
    Unavailable(String),
}

/// A translation provider. Implementations block the calling thread for
/// the duration of the network call.
pub trait Translator: Send + Sync {
    /// Registry key, e.g. `deepl`.
    fn name(&self) -> &str;

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, TranslateError>;

    /// Estimated provider cost of translating `text`, in the provider's
    /// billing currency.
    fn estimate_cost(&self, text: &str) -> f64;
}

/// Characters a provider bills for.
pub fn billable_chars(text: &str) -> usize {
    text.chars().count()
}
