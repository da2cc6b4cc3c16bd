//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::path::PathBuf;

use transq::config::{SchedulerConfig, Settings};
use transq::JobState;

/// Builder for creating `Settings` instances.
///
/// Defaults: `de` -> `en`, provider `scripted`, every scheduler trigger
/// disabled so tests drive maintenance explicitly.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        let mut settings = Settings::new("de", vec!["en".to_string()]);
        settings.translation.provider = Some("scripted".to_string());
        settings.scheduler = SchedulerConfig::disabled();
        Self { settings }
    }

    pub fn source_language(mut self, language: &str) -> Self {
        self.settings.source_language = language.to_string();
        self
    }

    pub fn target_languages(mut self, languages: &[&str]) -> Self {
        self.settings.target_languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn provider(mut self, provider: Option<&str>) -> Self {
        self.settings.translation.provider = provider.map(str::to_string);
        self
    }

    pub fn domain_hint(mut self, hint: &str) -> Self {
        self.settings.translation.domain_hint = Some(hint.to_string());
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.settings.queue.batch_size = size;
        self
    }

    pub fn max_chars_per_job(mut self, chars: usize) -> Self {
        self.settings.queue.max_chars_per_job = chars;
        self
    }

    pub fn max_chars_per_batch(mut self, chars: usize) -> Self {
        self.settings.queue.max_chars_per_batch = chars;
        self
    }

    pub fn lock_ttl_secs(mut self, secs: u64) -> Self {
        self.settings.queue.lock_ttl_secs = secs;
        self
    }

    pub fn retention(mut self, days: u32, states: &[JobState]) -> Self {
        self.settings.retention.days = days;
        self.settings.retention.states = states.to_vec();
        self
    }

    pub fn run_queue_secs(mut self, secs: u64) -> Self {
        self.settings.scheduler.run_queue_secs = secs;
        self
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.settings.database_path = Some(path);
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
