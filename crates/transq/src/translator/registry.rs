use std::collections::HashMap;
use std::sync::Arc;

use super::Translator;
use crate::config::TranslationConfig;
use crate::error::ConfigError;

/// Available translation providers, keyed by name.
#[derive(Clone, Default)]
pub struct TranslatorRegistry {
    providers: HashMap<String, Arc<dyn Translator>>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its own name, replacing any previous
    /// provider with that name.
    pub fn register(&mut self, translator: Arc<dyn Translator>) -> &mut Self {
        let name = translator.name().to_string();
        if self.providers.insert(name.clone(), translator).is_some() {
            log::warn!("Translation provider '{}' registered twice", name);
        }
        self
    }

    pub fn with(mut self, translator: Arc<dyn Translator>) -> Self {
        self.register(translator);
        self
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the provider the settings select.
    pub fn resolve(&self, config: &TranslationConfig) -> Result<Arc<dyn Translator>, ConfigError> {
        let name = config.provider.as_deref().ok_or(ConfigError::NoProvider)?;
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProvider(name.to_string()))
    }
}
