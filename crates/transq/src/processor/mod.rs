//! The batch processor that drains the translation queue.
//!
//! One `run_queue` body executes at a time across every process sharing
//! the database: the run holds the `queue` lease row for its whole
//! duration. Jobs are claimed with conditional updates, so even an
//! expired-lease takeover never processes a job twice concurrently.

mod summary;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

pub use summary::RunSummary;
use summary::{CharBudget, JobOutcome};

use crate::config::Settings;
use crate::content::{ContentAdapter, ContentError, FieldRef, ObjectId, ObjectRef, ObjectType};
use crate::db::lock_repo::{self, LockStatus, QUEUE_LOCK};
use crate::db::{Database, DatabaseError};
use crate::error::ProcessorError;
use crate::pairs::PairStore;
use crate::queue::{content_hash, ClaimedJob, DateColumn, Job, JobState, QueueStore};
use crate::translator::{billable_chars, TranslationRequest, Translator, TranslatorRegistry};

/// Drains the translation queue: claims jobs, translates their source
/// fields and writes the results into linked translation objects.
pub struct Processor {
    queue: QueueStore,
    pairs: PairStore,
    content: Arc<dyn ContentAdapter>,
    translators: TranslatorRegistry,
    settings: Arc<Settings>,
}

/// Releases the processor lease when a run ends, however it ends.
struct LeaseGuard<'a> {
    db: &'a Database,
    holder: String,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        match lock_repo::release(self.db, QUEUE_LOCK, &self.holder) {
            Ok(true) => debug!(holder = %self.holder, "Released processor lock"),
            Ok(false) => warn!(
                holder = %self.holder,
                "Processor lock was taken over before release; run outlived its lease"
            ),
            Err(e) => log::error!("Failed to release processor lock {}: {}", self.holder, e),
        }
    }
}

impl Processor {
    pub fn new(
        db: Database,
        content: Arc<dyn ContentAdapter>,
        translators: TranslatorRegistry,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            queue: QueueStore::new(db.clone()),
            pairs: PairStore::new(db),
            content,
            translators,
            settings,
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn pairs(&self) -> &PairStore {
        &self.pairs
    }

    pub fn content(&self) -> &Arc<dyn ContentAdapter> {
        &self.content
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn translators(&self) -> &TranslatorRegistry {
        &self.translators
    }

    /// Claims and processes one batch.
    ///
    /// Returns an empty summary with `lock_contended` set if another run
    /// holds the lock. Fails only on a configuration or store error; per-job
    /// failures are recorded on the jobs and counted in the summary.
    pub fn run_queue(&self) -> Result<RunSummary, ProcessorError> {
        let started = Instant::now();
        let holder = format!("{}-{}", std::process::id(), Uuid::new_v4());
        let span = info_span!("run_queue", holder = %holder);
        let _enter = span.enter();

        let db = self.queue.database();
        let ttl = self.settings.queue.lock_ttl();
        if !lock_repo::try_acquire(db, QUEUE_LOCK, &holder, ttl, Utc::now())? {
            debug!("Processor lock held by another run, skipping");
            return Ok(RunSummary::contended());
        }
        let guard = LeaseGuard { db, holder };

        let result = self.run_locked();
        drop(guard);

        let mut summary = result?;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        if !summary.is_empty() {
            info!(
                claimed = summary.claimed,
                processed = summary.processed,
                skipped = summary.skipped,
                errors = summary.errors,
                deferred = summary.deferred,
                duration_ms = summary.duration_ms,
                "Queue run finished"
            );
        }
        Ok(summary)
    }

    fn run_locked(&self) -> Result<RunSummary, ProcessorError> {
        // Resolve before claiming so a misconfigured deployment never
        // leaves jobs in `translating`.
        let translator = self.translators.resolve(&self.settings.translation)?;

        let claimed = self.queue.claim_batch(self.settings.queue.batch_size)?;
        let mut summary = RunSummary {
            claimed: claimed.len(),
            ..RunSummary::default()
        };
        if claimed.is_empty() {
            return Ok(summary);
        }
        debug!(count = claimed.len(), "Claimed jobs");

        let mut budget = CharBudget::new(self.settings.queue.max_chars_per_batch);
        let mut remaining = claimed.into_iter();
        while let Some(claimed_job) = remaining.next() {
            match self.process_job(translator.as_ref(), &claimed_job.job, &mut budget) {
                Ok(JobOutcome::Deferred) => {
                    summary.record(JobOutcome::Deferred);
                    summary.deferred += self.release_all(&claimed_job, remaining.by_ref())?;
                    info!(
                        deferred = summary.deferred,
                        limit = self.settings.queue.max_chars_per_batch,
                        "Batch character budget reached"
                    );
                    break;
                }
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    // The store is failing; hand back the current job and
                    // what is left so none is stranded in `translating`.
                    for job in std::iter::once(claimed_job).chain(remaining.by_ref()) {
                        self.release_best_effort(&job.job.id, job.claimed_from);
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(summary)
    }

    /// Hands a claimed job back after a store failure, logging instead of
    /// failing if that too is refused.
    fn release_best_effort(&self, id: &str, back_to: JobState) {
        match self.queue.release_claim(id, back_to) {
            Ok(true) => debug!(id, "Released job"),
            Ok(false) => {}
            Err(e) => log::error!("Failed to release job {}: {}", id, e),
        }
    }

    /// Hands `first` and everything after it back to their prior states.
    /// Returns how many of the rest were released.
    fn release_all(
        &self,
        first: &ClaimedJob,
        rest: impl Iterator<Item = ClaimedJob>,
    ) -> Result<usize, DatabaseError> {
        self.queue.release_claim(&first.job.id, first.claimed_from)?;
        let mut released = 0;
        for job in rest {
            self.queue.release_claim(&job.job.id, job.claimed_from)?;
            released += 1;
        }
        Ok(released)
    }

    /// Translates one `translating` job and records its outcome.
    ///
    /// Only store failures are returned as errors.
    fn process_job(
        &self,
        translator: &dyn Translator,
        job: &Job,
        budget: &mut CharBudget,
    ) -> Result<JobOutcome, DatabaseError> {
        let span = tracing::debug_span!(
            "job",
            id = %job.id,
            object = %job.object(),
            field = %job.field,
            lang = %job.target_language
        );
        let _enter = span.enter();

        let source = match self.content.read_field(job.object(), &job.field) {
            Ok(text) => text,
            Err(e) => return self.fail(job, &format!("Failed to read source: {}", e)),
        };

        if source.trim().is_empty() {
            debug!("Source is empty, skipping");
            if !self.queue.mark_skipped(&job.id)? {
                warn!("Job left translating state before it could be skipped");
            }
            return Ok(JobOutcome::Skipped);
        }

        let chars = billable_chars(&source);
        let per_job = self.settings.queue.max_chars_per_job;
        if per_job > 0 && chars > per_job {
            return self.fail(
                job,
                &format!(
                    "Source has {} characters, over the per-job limit of {}",
                    chars, per_job
                ),
            );
        }

        if !budget.admit(chars) {
            return Ok(JobOutcome::Deferred);
        }

        let hint = self.domain_hint(job);
        let request = TranslationRequest {
            text: &source,
            source_lang: &self.settings.source_language,
            target_lang: &job.target_language,
            domain_hint: Some(hint.as_str()),
        };
        let translated = match translator.translate(&request) {
            Ok(text) if text.trim().is_empty() => {
                return self.fail(
                    job,
                    &format!("{} returned an empty translation", translator.name()),
                )
            }
            Ok(text) => text,
            Err(e) => return self.fail(job, &e.to_string()),
        };

        let target = match self.translation_target(job.object(), &job.target_language) {
            Ok(target) => target,
            Err(TargetError::Content(e)) => {
                return self.fail(job, &format!("Failed to prepare translation object: {}", e))
            }
            Err(TargetError::Store(e)) => return Err(e),
        };

        if let Err(e) = self.content.write_field(target, &job.field, &translated) {
            return self.fail(job, &format!("Failed to write translation: {}", e));
        }

        match self.queue.mark_done(&job.id, &job.content_hash)? {
            Some(JobState::Done) => debug!(translation = %target, "Translated"),
            Some(state) => info!(
                state = %state,
                "Source changed while translating; translation kept, job requeued"
            ),
            None => warn!("Job left translating state before completion"),
        }
        Ok(JobOutcome::Done)
    }

    fn fail(&self, job: &Job, message: &str) -> Result<JobOutcome, DatabaseError> {
        warn!(error = %message, "Job failed");
        if !self.queue.mark_error(&job.id, message)? {
            warn!("Job left translating state before the error could be recorded");
        }
        Ok(JobOutcome::Failed)
    }

    fn domain_hint(&self, job: &Job) -> String {
        match self.settings.translation.domain_hint.as_deref() {
            Some(context) if !context.trim().is_empty() => {
                format!("{}; {}", context.trim(), job.domain_hint())
            }
            _ => job.domain_hint(),
        }
    }

    /// Returns the translation object of `source` for `language`, creating
    /// and linking it on first use or if the linked object was deleted.
    ///
    /// When a concurrent run links its own object first, that object is
    /// used and the one created here is discarded.
    fn translation_target(&self, source: ObjectRef, language: &str) -> Result<ObjectRef, TargetError> {
        let mut missing = None;
        if let Some(id) = self.pairs.translation_for(source, language)? {
            let existing = ObjectRef::new(source.object_type, id);
            if self.content.exists(existing)? {
                return Ok(existing);
            }
            info!(source = %source, missing = %existing, "Translation object is gone, recreating");
            missing = Some(id);
        }

        let created: ObjectId = self.content.create_translation(source, language)?;
        let linked = self.pairs.link(source, language, created, missing)?;
        if linked == created {
            debug!(source = %source, translation = created, language, "Linked new translation object");
        } else {
            info!(
                source = %source,
                translation = linked,
                language,
                "Translation object was linked concurrently; using it"
            );
            let orphan = ObjectRef::new(source.object_type, created);
            if let Err(e) = self.content.discard_translation(orphan) {
                warn!(orphan = %orphan, error = %e, "Failed to discard unlinked translation object");
            }
        }
        Ok(ObjectRef::new(source.object_type, linked))
    }

    /// Translates one object now, outside the batch.
    ///
    /// Each of `fields` is first enqueued from its current content for every
    /// target language, so content that was never queued is translated too.
    /// Then every job of the object not currently `translating` is claimed
    /// individually from its current state. Does not take the processor lock.
    pub fn translate_object_directly(
        &self,
        object: ObjectRef,
        fields: &[FieldRef],
    ) -> Result<RunSummary, ProcessorError> {
        let started = Instant::now();
        let span = info_span!("translate_directly", object = %object);
        let _enter = span.enter();

        let translator = self.translators.resolve(&self.settings.translation)?;
        for field in fields {
            match self.content.read_field(object, field) {
                Ok(text) => {
                    self.queue.enqueue_for_languages(
                        object,
                        field,
                        &self.settings.target_languages,
                        &content_hash(&text),
                    )?;
                }
                Err(e) => warn!(field = %field, error = %e, "Cannot read field, not enqueued"),
            }
        }
        let jobs = self.queue.jobs_for_object(object)?;
        if jobs.is_empty() {
            debug!("No jobs for object");
        }

        let mut summary = RunSummary::default();
        let mut budget = CharBudget::unlimited();
        for job in jobs {
            if job.state == JobState::Translating {
                debug!(id = %job.id, "Job is being translated elsewhere, skipping");
                continue;
            }
            if !self.queue.claim(&job.id, job.state)? {
                debug!(id = %job.id, "Job changed before it could be claimed, skipping");
                continue;
            }
            summary.claimed += 1;
            match self.process_job(translator.as_ref(), &job, &mut budget) {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    self.release_best_effort(&job.id, job.state);
                    return Err(e.into());
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            claimed = summary.claimed,
            processed = summary.processed,
            skipped = summary.skipped,
            errors = summary.errors,
            "Direct translation finished"
        );
        Ok(summary)
    }

    pub fn translate_post_directly(
        &self,
        post_id: ObjectId,
        fields: &[FieldRef],
    ) -> Result<RunSummary, ProcessorError> {
        self.translate_object_directly(ObjectRef::new(ObjectType::Post, post_id), fields)
    }

    /// Clears the processor lock regardless of holder.
    ///
    /// Jobs the crashed holder left in `translating` stay there; follow up
    /// with `reset_states(&[JobState::Translating])`.
    pub fn force_release_lock(&self) -> Result<bool, DatabaseError> {
        let released = lock_repo::force_release(self.queue.database(), QUEUE_LOCK)?;
        if released {
            warn!("Processor lock force-released");
        }
        Ok(released)
    }

    /// Force-releases the lock and returns stuck `translating` jobs to
    /// `pending`. Returns the number of jobs reset.
    pub fn recover_stuck_jobs(&self) -> Result<usize, DatabaseError> {
        self.force_release_lock()?;
        self.queue.reset_states(&[JobState::Translating])
    }

    pub fn lock_status(&self) -> Result<LockStatus, DatabaseError> {
        lock_repo::status(self.queue.database(), QUEUE_LOCK, Utc::now())
    }

    pub fn reset_states(&self, states: &[JobState]) -> Result<usize, DatabaseError> {
        self.queue.reset_states(states)
    }

    /// `outdated` -> `pending`.
    pub fn resync_outdated_jobs(&self) -> Result<usize, DatabaseError> {
        self.queue.reset_states(&[JobState::Outdated])
    }

    /// `error` -> `pending`.
    pub fn retry_failed_jobs(&self) -> Result<usize, DatabaseError> {
        self.queue.reset_states(&[JobState::Error])
    }

    /// Purges retained jobs past the configured retention, by the time
    /// they reached their final state.
    pub fn cleanup_queue(&self) -> Result<usize, DatabaseError> {
        let retention = &self.settings.retention;
        self.queue
            .cleanup_old_jobs(&retention.states, retention.days, DateColumn::UpdatedAt)
    }

    /// Qualifies legacy translation pairs with the first target language.
    pub fn migrate_legacy_pairs(&self) -> Result<usize, DatabaseError> {
        let Some(first) = self.settings.first_target_language() else {
            return Ok(0);
        };
        Ok(self.pairs.migrate_legacy_pairs(first)?.migrated)
    }
}

enum TargetError {
    Content(ContentError),
    Store(DatabaseError),
}

impl From<ContentError> for TargetError {
    fn from(e: ContentError) -> Self {
        TargetError::Content(e)
    }
}

impl From<DatabaseError> for TargetError {
    fn from(e: DatabaseError) -> Self {
        TargetError::Store(e)
    }
}
