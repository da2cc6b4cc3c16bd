//! Decides what an enqueue call does to the queue.
//!
//! Enqueue may be called on every content save, so this is the single
//! place that decides whether an edit actually requires translation work.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::job::JobState;

/// Outcome of comparing an enqueue call against the existing job, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// No job exists for the tuple: insert one in `pending`.
    CreatePending,
    /// The job already reflects this content.
    NoOp,
    /// A completed translation no longer matches its source.
    MarkOutdated,
    /// The content changed but the job is not completed; only the stored
    /// hash moves so in-flight or queued work is not disturbed.
    UpdateHashOnly,
}

/// Decides the disposition for an enqueue of `new_hash` given the
/// existing job's state and stored hash.
pub fn detect(existing: Option<(JobState, &str)>, new_hash: &str) -> Disposition {
    match existing {
        None => Disposition::CreatePending,
        Some((_, stored)) if stored == new_hash => Disposition::NoOp,
        Some((JobState::Done, _)) => Disposition::MarkOutdated,
        Some(_) => Disposition::UpdateHashOnly,
    }
}

/// Fingerprint of a field's source content, as hex-encoded SHA-256.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
