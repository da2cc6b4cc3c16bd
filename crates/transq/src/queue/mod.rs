//! The translation job queue: job model, change detection and the store.

pub mod change_detector;
pub mod job;
pub mod store;

pub use change_detector::{content_hash, detect, Disposition};
pub use job::{ClaimedJob, DateColumn, Enqueued, Job, JobId, JobState};
pub use store::QueueStore;
