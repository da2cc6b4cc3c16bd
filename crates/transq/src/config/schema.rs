use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::JobState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Settings with every section at its default.
    pub fn new(source_language: impl Into<String>, target_languages: Vec<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            source_language: source_language.into(),
            target_languages,
            database_path: None,
            translation: TranslationConfig::default(),
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            retention: RetentionConfig::default(),
            cost: CostConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// The configured database file, or `~/.transq/data/transq.db`.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    /// First configured target language; legacy pairs are qualified with it.
    pub fn first_target_language(&self) -> Option<&str> {
        self.target_languages.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Registered provider name; `None` leaves translation unconfigured.
    #[serde(default)]
    pub provider: Option<String>,
    /// Deployment-wide context prepended to each job's hint.
    #[serde(default)]
    pub domain_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_chars_per_job: usize,
    /// 0 = unlimited.
    #[serde(default)]
    pub max_chars_per_batch: usize,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_batch_size() -> usize {
    20
}

fn default_lock_ttl_secs() -> u64 {
    15 * 60
}

impl QueueConfig {
    /// Longest lease the loader accepts.
    pub const MAX_LOCK_TTL_SECS: u64 = 7 * 24 * 60 * 60;

    pub fn lock_ttl(&self) -> chrono::Duration {
        let secs = self.lock_ttl_secs.min(Self::MAX_LOCK_TTL_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_chars_per_job: 0,
            max_chars_per_batch: 0,
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

/// Trigger cadences in seconds. 0 disables the trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_run_queue_secs")]
    pub run_queue_secs: u64,
    #[serde(default = "default_retry_failed_secs")]
    pub retry_failed_secs: u64,
    #[serde(default = "default_resync_outdated_secs")]
    pub resync_outdated_secs: u64,
    #[serde(default = "default_cleanup_queue_secs")]
    pub cleanup_queue_secs: u64,
}

fn default_run_queue_secs() -> u64 {
    5 * 60
}

fn default_retry_failed_secs() -> u64 {
    60 * 60
}

fn default_resync_outdated_secs() -> u64 {
    60 * 60
}

fn default_cleanup_queue_secs() -> u64 {
    24 * 60 * 60
}

impl SchedulerConfig {
    /// Longest cadence the loader accepts: one year.
    pub const MAX_CADENCE_SECS: u64 = 365 * 24 * 60 * 60;

    /// Every trigger disabled.
    pub fn disabled() -> Self {
        Self {
            run_queue_secs: 0,
            retry_failed_secs: 0,
            resync_outdated_secs: 0,
            cleanup_queue_secs: 0,
        }
    }

    pub(crate) fn to_duration(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_queue_secs: default_run_queue_secs(),
            retry_failed_secs: default_retry_failed_secs(),
            resync_outdated_secs: default_resync_outdated_secs(),
            cleanup_queue_secs: default_cleanup_queue_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_retention_states")]
    pub states: Vec<JobState>,
}

fn default_retention_days() -> u32 {
    14
}

fn default_retention_states() -> Vec<JobState> {
    JobState::RETAINED.to_vec()
}

impl RetentionConfig {
    /// Longest retention the loader accepts: about a century.
    pub const MAX_DAYS: u32 = 36_500;
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
            states: default_retention_states(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

fn default_page_size() -> usize {
    100
}

fn default_max_jobs() -> usize {
    500
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_jobs: default_max_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
