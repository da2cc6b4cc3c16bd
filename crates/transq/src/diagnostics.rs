//! Operator-facing health snapshot of the queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::lock_repo::LockStatus;
use crate::db::scheduler_repo::{self, TriggerRun};
use crate::db::DatabaseError;
use crate::processor::Processor;
use crate::queue::{DateColumn, Job, JobState};
use crate::scheduler::Trigger;

/// Number of failed jobs listed in a snapshot.
pub const RECENT_ERROR_LIMIT: usize = 10;

/// A trigger counts as overdue once it has not started for this many
/// cadences.
const OVERDUE_FACTOR: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAge {
    pub job_id: String,
    pub at: DateTime<Utc>,
    pub age_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerHealth {
    pub trigger: Trigger,
    /// `None` when disabled.
    pub cadence_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<TriggerRun>,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub state_counts: BTreeMap<JobState, u64>,
    pub total_jobs: u64,
    pub lock: LockStatus,
    pub provider: Option<String>,
    pub oldest_pending: Option<JobAge>,
    pub oldest_completed: Option<JobAge>,
    pub due_for_cleanup: u64,
    /// Jobs in `translating` while no live run holds the lock.
    pub stuck_translating: u64,
    pub legacy_pairs: u64,
    pub triggers: Vec<TriggerHealth>,
    pub recent_errors: Vec<Job>,
    pub warnings: Vec<String>,
}

impl DiagnosticsSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Read-only health view over a processor's queue, lock and trigger
/// history. Takes no locks and writes nothing.
pub struct Diagnostics {
    processor: Arc<Processor>,
}

impl Diagnostics {
    pub fn new(processor: Arc<Processor>) -> Self {
        Self { processor }
    }

    pub fn snapshot(&self) -> Result<DiagnosticsSnapshot, DatabaseError> {
        let now = Utc::now();
        let queue = self.processor.queue();
        let settings = self.processor.settings();

        let state_counts = queue.get_state_counts()?;
        let total_jobs: u64 = state_counts.values().sum();
        let lock = self.processor.lock_status()?;
        let provider = self
            .processor
            .translators()
            .resolve(&settings.translation)
            .ok()
            .map(|t| t.name().to_string());

        let age = |job: Option<Job>, column: DateColumn| {
            job.map(|job| {
                let at = match column {
                    DateColumn::CreatedAt => job.created_at,
                    DateColumn::UpdatedAt => job.updated_at,
                };
                JobAge {
                    job_id: job.id,
                    at,
                    age_secs: (now - at).num_seconds(),
                }
            })
        };
        let oldest_pending = age(
            queue.get_oldest_job_for_states(&[JobState::Pending], DateColumn::CreatedAt)?,
            DateColumn::CreatedAt,
        );
        let oldest_completed = age(
            queue.get_oldest_job_for_states(&settings.retention.states, DateColumn::UpdatedAt)?,
            DateColumn::UpdatedAt,
        );
        let due_for_cleanup = queue.count_old_jobs(
            &settings.retention.states,
            settings.retention.days,
            DateColumn::UpdatedAt,
        )?;

        let translating = state_counts
            .get(&JobState::Translating)
            .copied()
            .unwrap_or(0);
        let lock_live = lock.held && !lock.expired;
        let stuck_translating = if lock_live { 0 } else { translating };

        let legacy_pairs = self.processor.pairs().count_legacy()?;

        let runs: BTreeMap<String, TriggerRun> = scheduler_repo::list(queue.database())?
            .into_iter()
            .map(|run| (run.trigger_name.clone(), run))
            .collect();
        let triggers: Vec<TriggerHealth> = Trigger::ALL
            .into_iter()
            .map(|trigger| {
                let cadence = trigger.cadence(&settings.scheduler);
                let last_run = runs.get(trigger.as_str()).cloned();
                let overdue = match (cadence, last_run.as_ref().and_then(|r| r.last_started_at)) {
                    (Some(cadence), Some(started)) => match cadence.checked_mul(OVERDUE_FACTOR) {
                        Some(window) => (now - started)
                            .to_std()
                            .map(|elapsed| elapsed > window)
                            .unwrap_or(false),
                        // Too long to ever be exceeded.
                        None => false,
                    },
                    _ => false,
                };
                TriggerHealth {
                    trigger,
                    cadence_secs: cadence.map(|c| c.as_secs()),
                    last_run,
                    overdue,
                }
            })
            .collect();

        let recent_errors = queue.recent_errors(RECENT_ERROR_LIMIT)?;

        let mut warnings = Vec::new();
        if provider.is_none() {
            warnings.push("No usable translation provider is configured".to_string());
        }
        if lock.held && lock.expired {
            warnings.push(format!(
                "Processor lock held by {} expired; the next run will take it over",
                lock.holder.as_deref().unwrap_or("unknown")
            ));
        }
        if stuck_translating > 0 {
            warnings.push(format!(
                "{} job(s) are translating while no run holds the lock; reset them to pending",
                stuck_translating
            ));
        }
        for health in triggers.iter().filter(|h| h.overdue) {
            warnings.push(format!(
                "Trigger {} has not run for over {} cadences",
                health.trigger, OVERDUE_FACTOR
            ));
        }
        for run in runs.values() {
            if run.last_outcome.as_deref() == Some("failed") {
                warnings.push(format!(
                    "Last {} run failed: {}",
                    run.trigger_name,
                    run.last_error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        let errors = state_counts.get(&JobState::Error).copied().unwrap_or(0);
        if errors > 0 {
            warnings.push(format!("{} job(s) failed and await retry", errors));
        }
        if legacy_pairs > 0 {
            warnings.push(format!(
                "{} legacy translation pair(s) need migration",
                legacy_pairs
            ));
        }

        Ok(DiagnosticsSnapshot {
            generated_at: now,
            state_counts,
            total_jobs,
            lock,
            provider,
            oldest_pending,
            oldest_completed,
            due_for_cleanup,
            stuck_translating,
            legacy_pairs,
            triggers,
            recent_errors,
            warnings,
        })
    }
}
