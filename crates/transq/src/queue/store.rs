use std::collections::BTreeMap;

use chrono::Utc;

use super::{ClaimedJob, DateColumn, Disposition, Enqueued, Job, JobState};
use crate::content::{FieldRef, ObjectRef, ObjectType};
use crate::db::{job_repo, Database, DatabaseError};

/// The persistent translation queue.
///
/// Thin, clock-supplying front over [`job_repo`]; every read or write of
/// queue state in the crate goes through here. Cloning is cheap.
#[derive(Clone)]
pub struct QueueStore {
    db: Database,
}

impl QueueStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Upserts the job for `(object, field, language)` with the current
    /// source fingerprint. Safe to call on every content save.
    pub fn enqueue(
        &self,
        object: ObjectRef,
        field: &FieldRef,
        language: &str,
        hash: &str,
    ) -> Result<Enqueued, DatabaseError> {
        let result = job_repo::enqueue(&self.db, object, field, language, hash, Utc::now())?;
        match result.disposition {
            Disposition::NoOp => {}
            disposition => log::debug!(
                "Enqueue {} {} -> {}: {:?} (job {})",
                object,
                field,
                language,
                disposition,
                result.id
            ),
        }
        Ok(result)
    }

    /// Enqueues one job per target language for the same source field.
    pub fn enqueue_for_languages<S: AsRef<str>>(
        &self,
        object: ObjectRef,
        field: &FieldRef,
        languages: &[S],
        hash: &str,
    ) -> Result<Vec<(String, Enqueued)>, DatabaseError> {
        languages
            .iter()
            .map(|language| {
                let language = language.as_ref();
                self.enqueue(object, field, language, hash)
                    .map(|result| (language.to_string(), result))
            })
            .collect()
    }

    pub fn find_job(&self, id: &str) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_id(&self.db, id)
    }

    pub fn find_job_for(
        &self,
        object: ObjectRef,
        field: &FieldRef,
        language: &str,
    ) -> Result<Option<Job>, DatabaseError> {
        job_repo::find_by_tuple(&self.db, object, field, language)
    }

    pub fn jobs_for_object(&self, object: ObjectRef) -> Result<Vec<Job>, DatabaseError> {
        job_repo::find_for_object(&self.db, object)
    }

    /// Page of jobs in `states`, oldest first.
    pub fn get_jobs_for_states(
        &self,
        states: &[JobState],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>, DatabaseError> {
        job_repo::get_jobs_for_states(&self.db, states, limit, offset)
    }

    pub fn get_state_counts(&self) -> Result<BTreeMap<JobState, u64>, DatabaseError> {
        job_repo::get_state_counts(&self.db)
    }

    pub fn count_by_state(&self, state: JobState) -> Result<u64, DatabaseError> {
        job_repo::count_by_state(&self.db, state)
    }

    pub fn count_completed_jobs(
        &self,
        object_type: ObjectType,
        field: Option<&FieldRef>,
    ) -> Result<u64, DatabaseError> {
        job_repo::count_completed_jobs(&self.db, object_type, field)
    }

    /// Moves jobs in `states` back to `pending`; returns rows changed.
    pub fn reset_states(&self, states: &[JobState]) -> Result<usize, DatabaseError> {
        let count = job_repo::reset_states(&self.db, states, Utc::now())?;
        if count > 0 {
            log::info!("Reset {} job(s) from {:?} to pending", count, states);
        }
        Ok(count)
    }

    pub fn get_oldest_job_for_states(
        &self,
        states: &[JobState],
        column: DateColumn,
    ) -> Result<Option<Job>, DatabaseError> {
        job_repo::get_oldest_job_for_states(&self.db, states, column)
    }

    pub fn count_old_jobs(
        &self,
        states: &[JobState],
        days: u32,
        column: DateColumn,
    ) -> Result<u64, DatabaseError> {
        job_repo::count_old_jobs(&self.db, states, days, column, Utc::now())
    }

    /// Deletes jobs in `states` older than `days` by `column`; returns rows deleted.
    pub fn cleanup_old_jobs(
        &self,
        states: &[JobState],
        days: u32,
        column: DateColumn,
    ) -> Result<usize, DatabaseError> {
        let deleted = job_repo::cleanup_old_jobs(&self.db, states, days, column, Utc::now())?;
        if deleted > 0 {
            log::info!(
                "Cleaned up {} job(s) in {:?} older than {} days by {}",
                deleted,
                states,
                days,
                column.column()
            );
        }
        Ok(deleted)
    }

    pub fn claim_batch(&self, limit: usize) -> Result<Vec<ClaimedJob>, DatabaseError> {
        job_repo::claim_batch(&self.db, limit, Utc::now())
    }

    pub fn claim(&self, id: &str, expected: JobState) -> Result<bool, DatabaseError> {
        job_repo::claim(&self.db, id, expected, Utc::now())
    }

    pub fn mark_done(&self, id: &str, hash_used: &str) -> Result<Option<JobState>, DatabaseError> {
        job_repo::mark_done(&self.db, id, hash_used, Utc::now())
    }

    pub fn mark_error(&self, id: &str, message: &str) -> Result<bool, DatabaseError> {
        job_repo::mark_error(&self.db, id, message, Utc::now())
    }

    pub fn mark_skipped(&self, id: &str) -> Result<bool, DatabaseError> {
        job_repo::mark_skipped(&self.db, id, Utc::now())
    }

    pub fn release_claim(&self, id: &str, back_to: JobState) -> Result<bool, DatabaseError> {
        job_repo::release_claim(&self.db, id, back_to, Utc::now())
    }

    pub fn recent_errors(&self, limit: usize) -> Result<Vec<Job>, DatabaseError> {
        job_repo::recent_errors(&self.db, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> QueueStore {
        QueueStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_enqueue_for_languages_fans_out() {
        let store = store();
        let post = ObjectRef::post(7);
        let title = FieldRef::attribute("title");

        let results = store
            .enqueue_for_languages(post, &title, &["en", "fr", "es"], "h1")
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results
            .iter()
            .all(|(_, r)| r.disposition == Disposition::CreatePending));
        assert_eq!(store.jobs_for_object(post).unwrap().len(), 3);

        let again = store
            .enqueue_for_languages(post, &title, &["en", "fr"], "h1")
            .unwrap();
        assert!(again.iter().all(|(_, r)| r.disposition == Disposition::NoOp));
        assert_eq!(again[1].0, "fr");
    }

    #[test]
    fn test_reset_outdated_is_resync() {
        let store = store();
        let post = ObjectRef::post(1);
        let title = FieldRef::attribute("title");
        let job = store.enqueue(post, &title, "en", "h1").unwrap();
        store.claim(&job.id, JobState::Pending).unwrap();
        store.mark_done(&job.id, "h1").unwrap();
        store.enqueue(post, &title, "en", "h2").unwrap();
        assert_eq!(store.count_by_state(JobState::Outdated).unwrap(), 1);

        assert_eq!(store.reset_states(&[JobState::Outdated]).unwrap(), 1);
        let job = store.find_job_for(post, &title, "en").unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.content_hash, "h2");
    }

    #[test]
    fn test_fresh_jobs_are_not_old() {
        let store = store();
        let job = store
            .enqueue(ObjectRef::post(1), &FieldRef::attribute("title"), "en", "h")
            .unwrap();
        store.claim(&job.id, JobState::Pending).unwrap();
        store.mark_done(&job.id, "h").unwrap();

        assert_eq!(
            store
                .count_old_jobs(&[JobState::Done], 1, DateColumn::UpdatedAt)
                .unwrap(),
            0
        );
        // Zero days: anything strictly older than now.
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(
            store
                .cleanup_old_jobs(&[JobState::Done], 0, DateColumn::UpdatedAt)
                .unwrap(),
            1
        );
    }
}
