//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides an isolated environment for testing
//! the queue end to end:
//! - A temporary directory holding the SQLite database and settings files
//! - An in-memory content repository standing in for the host CMS
//! - A scripted translation provider that records every call

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use transq::content::{FieldRef, MemoryContent, ObjectRef};
use transq::{
    content_hash, Database, Enqueued, Processor, Settings, TranslateError, TranslationRequest,
    Translator, TranslatorRegistry,
};

type Hook = Box<dyn Fn(&TranslationRequest<'_>) + Send + Sync>;

/// A provider double. Unscripted texts translate to `[lang] text`.
pub struct ScriptedTranslator {
    name: String,
    responses: Mutex<HashMap<String, Result<String, TranslateError>>>,
    calls: Mutex<Vec<(String, String)>>,
    hints: Mutex<Vec<Option<String>>>,
    hook: Mutex<Option<Hook>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTranslator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            hints: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Answer `source` with `translation`.
    pub fn respond(&self, source: &str, translation: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(source.to_string(), Ok(translation.to_string()));
    }

    /// Fail every request for `source` with a provider error.
    pub fn fail_on(&self, source: &str, message: &str) {
        self.responses.lock().unwrap().insert(
            source.to_string(),
            Err(TranslateError::Provider {
                provider: self.name.clone(),
                message: message.to_string(),
            }),
        );
    }

    /// Runs `hook` inside every translate call, before answering.
    pub fn set_hook(&self, hook: impl Fn(&TranslationRequest<'_>) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Makes every call block for `delay`, like a slow network.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// `(source text, target language)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().unwrap().clone()
    }
}

impl Translator for ScriptedTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String, TranslateError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.text.to_string(), request.target_lang.to_string()));
        self.hints
            .lock()
            .unwrap()
            .push(request.domain_hint.map(str::to_string));

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(request);
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        match self.responses.lock().unwrap().get(request.text) {
            Some(answer) => answer.clone(),
            None => Ok(format!("[{}] {}", request.target_lang, request.text)),
        }
    }

    fn estimate_cost(&self, text: &str) -> f64 {
        text.chars().count() as f64 * 0.00002
    }
}

/// Test harness providing an isolated execution environment.
pub struct TestHarness {
    /// Temporary directory holding the database and settings files.
    temp_dir: TempDir,
    /// Path of the SQLite database file inside `temp_dir`.
    pub db_path: PathBuf,
    pub content: Arc<MemoryContent>,
    pub translator: Arc<ScriptedTranslator>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("transq.db");

        Self {
            temp_dir,
            db_path,
            content: Arc::new(MemoryContent::new()),
            translator: Arc::new(ScriptedTranslator::new("scripted")),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens a new connection to the harness database, as a separate
    /// process would.
    pub fn open_database(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to open database")
    }

    pub fn registry(&self) -> TranslatorRegistry {
        TranslatorRegistry::new().with(self.translator.clone())
    }

    /// A processor on its own connection to the harness database.
    pub fn processor(&self, settings: Settings) -> Arc<Processor> {
        Arc::new(Processor::new(
            self.open_database(),
            self.content.clone(),
            self.registry(),
            Arc::new(settings),
        ))
    }

    /// Simulates a content save: stores `text` and enqueues the field for
    /// every target language.
    pub fn edit(
        &self,
        processor: &Processor,
        object: ObjectRef,
        field: &FieldRef,
        text: &str,
    ) -> Vec<(String, Enqueued)> {
        self.content.set_field(object, field.clone(), text);
        processor
            .queue()
            .enqueue_for_languages(
                object,
                field,
                &processor.settings().target_languages,
                &content_hash(text),
            )
            .expect("Failed to enqueue")
    }

    /// Writes settings as JSON into the temp directory.
    pub fn write_settings(&self, filename: &str, settings: &Settings) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        let json = serde_json::to_string_pretty(settings).expect("Failed to serialize settings");
        std::fs::write(&path, json).expect("Failed to write settings file");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
