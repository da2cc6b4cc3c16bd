use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{QueueConfig, RetentionConfig, SchedulerConfig, Settings};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/settings-v1.json");

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let settings: Settings = serde_json::from_value(json_value)?;

    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks the schema cannot express.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported settings version: {}",
            settings.version
        )));
    }

    if settings.target_languages.is_empty() {
        return Err(invalid("At least one target language is required"));
    }

    let mut seen = HashSet::new();
    for language in &settings.target_languages {
        if language == &settings.source_language {
            return Err(invalid(format!(
                "Target language '{}' is the source language",
                language
            )));
        }
        if !seen.insert(language.as_str()) {
            return Err(invalid(format!("Duplicate target language '{}'", language)));
        }
    }

    if settings.queue.batch_size == 0 {
        return Err(invalid("queue.batch_size must be greater than 0"));
    }
    if settings.queue.lock_ttl_secs == 0 || settings.queue.lock_ttl_secs > QueueConfig::MAX_LOCK_TTL_SECS
    {
        return Err(invalid(format!(
            "queue.lock_ttl_secs must be between 1 and {}",
            QueueConfig::MAX_LOCK_TTL_SECS
        )));
    }

    let scheduler = &settings.scheduler;
    for (name, secs) in [
        ("run_queue_secs", scheduler.run_queue_secs),
        ("retry_failed_secs", scheduler.retry_failed_secs),
        ("resync_outdated_secs", scheduler.resync_outdated_secs),
        ("cleanup_queue_secs", scheduler.cleanup_queue_secs),
    ] {
        if secs > SchedulerConfig::MAX_CADENCE_SECS {
            return Err(invalid(format!(
                "scheduler.{} must be at most {}",
                name,
                SchedulerConfig::MAX_CADENCE_SECS
            )));
        }
    }

    if settings.retention.days > RetentionConfig::MAX_DAYS {
        return Err(invalid(format!(
            "retention.days must be at most {}",
            RetentionConfig::MAX_DAYS
        )));
    }

    if settings.cost.page_size == 0 || settings.cost.max_jobs == 0 {
        return Err(invalid("cost.page_size and cost.max_jobs must be greater than 0"));
    }

    if let Some(state) = settings.retention.states.iter().find(|s| !s.is_terminal()) {
        return Err(invalid(format!(
            "retention.states may only name terminal states, got '{}'",
            state
        )));
    }

    if matches!(settings.translation.provider.as_deref(), Some(p) if p.trim().is_empty()) {
        return Err(invalid("translation.provider must not be blank"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
