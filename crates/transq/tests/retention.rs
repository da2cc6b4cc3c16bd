//! Retention of completed jobs, driven with explicit clocks.

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};

use common::{SettingsBuilder, TestHarness};
use transq::content::{FieldRef, ObjectRef, ObjectType};
use transq::db::job_repo;
use transq::{Database, DateColumn, JobState};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 30, 9, 0, 0).unwrap()
}

/// Enqueues post `id` at `created`, claims it and completes it at `finished`.
fn done_job(db: &Database, id: i64, created: DateTime<Utc>, finished: DateTime<Utc>) -> String {
    let job = job_repo::enqueue(db, ObjectRef::post(id), &FieldRef::attribute("title"), "en", "h", created)
        .unwrap();
    assert!(job_repo::claim(db, &job.id, JobState::Pending, finished).unwrap());
    assert_eq!(
        job_repo::mark_done(db, &job.id, "h", finished).unwrap(),
        Some(JobState::Done)
    );
    job.id
}

#[test]
fn test_cleanup_deletes_only_old_done_jobs() {
    let harness = TestHarness::new();
    let db = harness.open_database();

    let old = done_job(&db, 1, now() - Duration::days(40), now() - Duration::days(30));
    let recent = done_job(&db, 2, now() - Duration::days(3), now() - Duration::days(2));
    let old_pending = job_repo::enqueue(
        &db,
        ObjectRef::post(3),
        &FieldRef::attribute("title"),
        "en",
        "h",
        now() - Duration::days(60),
    )
    .unwrap();

    assert_eq!(
        job_repo::count_old_jobs(&db, &[JobState::Done], 14, DateColumn::UpdatedAt, now()).unwrap(),
        1
    );
    let deleted =
        job_repo::cleanup_old_jobs(&db, &[JobState::Done], 14, DateColumn::UpdatedAt, now()).unwrap();
    assert_eq!(deleted, 1);

    assert!(job_repo::find_by_id(&db, &old).unwrap().is_none());
    assert!(job_repo::find_by_id(&db, &recent).unwrap().is_some());
    // Non-retained states are never purged, however old.
    assert_eq!(
        job_repo::find_by_id(&db, &old_pending.id).unwrap().unwrap().state,
        JobState::Pending
    );
}

#[test]
fn test_created_at_and_updated_at_measure_different_ages() {
    let harness = TestHarness::new();
    let db = harness.open_database();

    // Queued long ago, translated yesterday.
    let id = done_job(&db, 1, now() - Duration::days(30), now() - Duration::days(1));

    let by_created =
        job_repo::count_old_jobs(&db, &[JobState::Done], 14, DateColumn::CreatedAt, now()).unwrap();
    let by_updated =
        job_repo::count_old_jobs(&db, &[JobState::Done], 14, DateColumn::UpdatedAt, now()).unwrap();
    assert_eq!((by_created, by_updated), (1, 0));

    assert_eq!(
        job_repo::cleanup_old_jobs(&db, &[JobState::Done], 14, DateColumn::UpdatedAt, now()).unwrap(),
        0
    );
    assert_eq!(
        job_repo::cleanup_old_jobs(&db, &[JobState::Done], 14, DateColumn::CreatedAt, now()).unwrap(),
        1
    );
    assert!(job_repo::find_by_id(&db, &id).unwrap().is_none());
}

#[test]
fn test_oldest_job_by_column() {
    let harness = TestHarness::new();
    let db = harness.open_database();

    let first_queued = done_job(&db, 1, now() - Duration::days(10), now() - Duration::days(1));
    let first_finished = done_job(&db, 2, now() - Duration::days(5), now() - Duration::days(4));

    let by_created =
        job_repo::get_oldest_job_for_states(&db, &[JobState::Done], DateColumn::CreatedAt).unwrap();
    let by_updated =
        job_repo::get_oldest_job_for_states(&db, &[JobState::Done], DateColumn::UpdatedAt).unwrap();
    assert_eq!(by_created.unwrap().id, first_queued);
    assert_eq!(by_updated.unwrap().id, first_finished);
}

#[test]
fn test_processor_cleanup_uses_configured_retention() {
    let harness = TestHarness::new();
    let db = harness.open_database();
    let now = Utc::now();

    let done = done_job(&db, 1, now - Duration::days(20), now - Duration::days(10));
    let skipped = job_repo::enqueue(&db, ObjectRef::post(2), &FieldRef::attribute("title"), "en", "h", now - Duration::days(20))
        .unwrap();
    job_repo::claim(&db, &skipped.id, JobState::Pending, now - Duration::days(10)).unwrap();
    job_repo::mark_skipped(&db, &skipped.id, now - Duration::days(10)).unwrap();

    // Seven days, and only skipped jobs are purged.
    let processor = harness.processor(
        SettingsBuilder::new()
            .retention(7, &[JobState::Skipped])
            .build(),
    );
    assert_eq!(processor.cleanup_queue().unwrap(), 1);
    assert!(processor.queue().find_job(&skipped.id).unwrap().is_none());
    assert!(processor.queue().find_job(&done).unwrap().is_some());

    let processor = harness.processor(SettingsBuilder::new().retention(7, &JobState::RETAINED).build());
    assert_eq!(processor.cleanup_queue().unwrap(), 1);
    assert!(processor.queue().find_job(&done).unwrap().is_none());
}

#[test]
fn test_completed_counts_by_object_type_and_field() {
    let harness = TestHarness::new();
    let db = harness.open_database();
    done_job(&db, 1, now() - Duration::days(3), now() - Duration::days(2));
    done_job(&db, 2, now() - Duration::hours(3), now() - Duration::hours(2));
    job_repo::enqueue(&db, ObjectRef::post(3), &FieldRef::attribute("title"), "en", "h", now()).unwrap();

    let title = FieldRef::attribute("title");
    assert_eq!(job_repo::count_completed_jobs(&db, ObjectType::Post, None).unwrap(), 2);
    assert_eq!(job_repo::count_completed_jobs(&db, ObjectType::Post, Some(&title)).unwrap(), 2);
    assert_eq!(
        job_repo::count_completed_jobs(&db, ObjectType::Post, Some(&FieldRef::attribute("excerpt")))
            .unwrap(),
        0
    );
    assert_eq!(job_repo::count_completed_jobs(&db, ObjectType::Term, None).unwrap(), 0);
}
