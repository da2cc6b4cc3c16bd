//! Processors on separate connections sharing one database file, as
//! separate worker processes would.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, OnceLock};
use std::thread;
use std::time::Duration;

use common::{SettingsBuilder, TestHarness};
use transq::content::{ContentAdapter, ContentError, FieldRef, MemoryContent, ObjectId, ObjectRef};
use transq::{JobState, Processor, QueueStore, RunSummary};

#[test]
fn test_concurrent_runs_translate_each_job_once() {
    let harness = TestHarness::new();
    let settings = SettingsBuilder::new().batch_size(5).build();
    let seed = harness.processor(settings.clone());
    for id in 1..=20 {
        harness.edit(&seed, ObjectRef::post(id), &FieldRef::attribute("title"), &format!("Titel {}", id));
    }
    harness.translator.set_delay(Duration::from_millis(5));

    let workers = 3;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let processor = harness.processor(settings.clone());
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut summaries: Vec<RunSummary> = Vec::new();
                while processor.queue().count_by_state(JobState::Pending).unwrap() > 0
                    || processor.queue().count_by_state(JobState::Translating).unwrap() > 0
                {
                    summaries.push(processor.run_queue().unwrap());
                    thread::sleep(Duration::from_millis(2));
                }
                summaries
            })
        })
        .collect();

    let summaries: Vec<RunSummary> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let claimed: usize = summaries.iter().map(|s| s.claimed).sum();
    let processed: usize = summaries.iter().map(|s| s.processed).sum();
    assert_eq!(claimed, 20);
    assert_eq!(processed, 20);
    // A contended run claims nothing.
    assert!(summaries
        .iter()
        .filter(|s| s.lock_contended)
        .all(|s| s.claimed == 0));

    let mut sources: Vec<String> = harness.translator.calls().into_iter().map(|(text, _)| text).collect();
    sources.sort();
    let unique: HashSet<&String> = sources.iter().collect();
    assert_eq!(sources.len(), 20);
    assert_eq!(unique.len(), 20);

    let counts = seed.queue().get_state_counts().unwrap();
    assert_eq!(counts[&JobState::Done], 20);
    assert!(!seed.lock_status().unwrap().held);
}

#[test]
fn test_concurrent_claims_are_disjoint() {
    let harness = TestHarness::new();
    let seed = QueueStore::new(harness.open_database());
    for id in 1..=40 {
        seed.enqueue(ObjectRef::post(id), &FieldRef::attribute("title"), "en", "h")
            .unwrap();
    }

    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let queue = QueueStore::new(harness.open_database());
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::new();
                loop {
                    let batch = queue.claim_batch(3).unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    ids.extend(batch.into_iter().map(|c| c.job.id));
                }
                ids
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().unwrap() {
            total += 1;
            assert!(seen.insert(id.clone()), "job {} claimed twice", id);
        }
    }
    assert_eq!(total, 40);
    assert_eq!(seed.count_by_state(JobState::Translating).unwrap(), 40);
    assert!(seed
        .get_jobs_for_states(&[JobState::Translating], 100, 0)
        .unwrap()
        .iter()
        .all(|job| job.attempts == 1));
}

#[test]
fn test_direct_translation_does_not_steal_running_jobs() {
    let harness = TestHarness::new();
    let processor = harness.processor(SettingsBuilder::new().build());
    let post = ObjectRef::post(1);
    harness.edit(&processor, post, &FieldRef::attribute("title"), "Eins");
    harness.edit(&processor, post, &FieldRef::attribute("excerpt"), "Zwei");

    // Another worker holds one of the two jobs.
    let other = QueueStore::new(harness.open_database());
    let held = &other.claim_batch(1).unwrap()[0];

    let summary = processor.translate_post_directly(post.id, &[]).unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(
        other.find_job(&held.job.id).unwrap().unwrap().state,
        JobState::Translating
    );
    assert_eq!(harness.translator.call_count(), 1);
}

/// Content backend that lets a direct translation of the same object run
/// while the first translation object is being created.
struct InterleavedContent {
    inner: Arc<MemoryContent>,
    direct: OnceLock<Arc<Processor>>,
    fired: AtomicBool,
}

impl ContentAdapter for InterleavedContent {
    fn read_field(&self, object: ObjectRef, field: &FieldRef) -> Result<String, ContentError> {
        self.inner.read_field(object, field)
    }

    fn write_field(&self, object: ObjectRef, field: &FieldRef, text: &str) -> Result<(), ContentError> {
        self.inner.write_field(object, field, text)
    }

    fn create_translation(&self, source: ObjectRef, language: &str) -> Result<ObjectId, ContentError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some(direct) = self.direct.get() {
                let summary = direct.translate_object_directly(source, &[]).unwrap();
                assert_eq!(summary.processed, 1);
            }
        }
        self.inner.create_translation(source, language)
    }

    fn discard_translation(&self, translation: ObjectRef) -> Result<(), ContentError> {
        self.inner.discard_translation(translation)
    }

    fn exists(&self, object: ObjectRef) -> Result<bool, ContentError> {
        self.inner.exists(object)
    }
}

#[test]
fn test_direct_translation_racing_batch_links_one_object() {
    let harness = TestHarness::new();
    let settings = SettingsBuilder::new().batch_size(1).build();
    let direct = harness.processor(settings.clone());
    let post = ObjectRef::post(1);
    let title = FieldRef::attribute("title");
    let body = FieldRef::attribute("content");
    harness.edit(&direct, post, &title, "Titel");
    harness.edit(&direct, post, &body, "Text");

    let content = Arc::new(InterleavedContent {
        inner: harness.content.clone(),
        direct: OnceLock::new(),
        fired: AtomicBool::new(false),
    });
    let _ = content.direct.set(direct.clone());
    let batch = Processor::new(
        harness.open_database(),
        content,
        harness.registry(),
        Arc::new(settings),
    );

    // The batch holds one job; the direct run translates the other and
    // links its object before the batch gets to link its own.
    let summary = batch.run_queue().unwrap();
    assert_eq!(summary.processed, 1);

    let linked = ObjectRef::post(direct.pairs().translation_for(post, "en").unwrap().unwrap());
    assert_eq!(harness.content.field(linked, &title).as_deref(), Some("[en] Titel"));
    assert_eq!(harness.content.field(linked, &body).as_deref(), Some("[en] Text"));

    let claiming: Vec<ObjectId> = (100_000..100_010)
        .filter(|id| harness.content.source_of(ObjectRef::post(*id)).is_some())
        .collect();
    assert_eq!(claiming, vec![linked.id]);
    assert_eq!(direct.queue().count_by_state(JobState::Done).unwrap(), 2);
}
