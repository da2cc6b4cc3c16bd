use std::path::PathBuf;
use thiserror::Error;

use crate::content::ContentError;
use crate::translator::TranslateError;

#[derive(Error, Debug)]
pub enum TransqError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("No translation provider configured")]
    NoProvider,

    #[error("Unknown translation provider '{0}'")]
    UnknownProvider(String),
}

/// Batch-level failures. Per-job failures never surface here; they are
/// recorded on the job row.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Translator unavailable: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue store failure: {0}")]
    Store(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Failed to start scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Scheduler thread panicked")]
    Panicked,

    #[error("Cadence of {trigger} ({secs}s) exceeds the maximum of {max}s")]
    InvalidCadence { trigger: String, secs: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, TransqError>;
