pub mod config;
pub mod content;
pub mod cost;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod pairs;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod translator;

pub use config::{load_settings, load_settings_from_str, Settings};
pub use content::{ContentAdapter, ContentError, FieldRef, MemoryContent, ObjectRef, ObjectType};
pub use cost::{CostEstimate, CostEstimator};
pub use db::{Database, DatabaseError};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{ConfigError, ProcessorError, Result, SchedulerError, TransqError};
pub use pairs::PairStore;
pub use processor::{Processor, RunSummary};
pub use queue::{content_hash, DateColumn, Disposition, Enqueued, Job, JobState, QueueStore};
pub use scheduler::{FireOutcome, Scheduler, Trigger};
pub use service::Transq;
pub use translator::{TranslateError, TranslationRequest, Translator, TranslatorRegistry};
