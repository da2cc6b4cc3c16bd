use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{FieldRef, ObjectRef, ObjectType};

/// Opaque, stable job identifier.
pub type JobId = String;

/// Position of a job in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Translating,
    Outdated,
    Done,
    Error,
    Skipped,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Translating,
        JobState::Outdated,
        JobState::Done,
        JobState::Error,
        JobState::Skipped,
    ];

    /// States the processor claims from.
    pub const CLAIMABLE: [JobState; 2] = [JobState::Pending, JobState::Outdated];

    /// States retained until cleanup purges them.
    pub const RETAINED: [JobState; 3] = [JobState::Done, JobState::Skipped, JobState::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Translating => "translating",
            JobState::Outdated => "outdated",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::Skipped => "skipped",
        }
    }

    /// Whether a job in this state waits for no further processing until
    /// a maintenance operation or a new enqueue moves it.
    pub fn is_terminal(&self) -> bool {
        Self::RETAINED.contains(self)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown job state '{}'", s))
    }
}

/// Timestamp column used for age-based queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateColumn {
    CreatedAt,
    UpdatedAt,
}

impl DateColumn {
    /// The SQL column name. Only these two fixed identifiers are ever
    /// interpolated into queries.
    pub fn column(&self) -> &'static str {
        match self {
            DateColumn::CreatedAt => "created_at",
            DateColumn::UpdatedAt => "updated_at",
        }
    }
}

/// One unit of queued translation work for an (object, field, language) tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub object_type: ObjectType,
    pub object_id: i64,
    pub field: FieldRef,
    pub target_language: String,
    pub content_hash: String,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(self.object_type, self.object_id)
    }

    /// Hint passed to the translator describing what is being translated,
    /// e.g. `post:title` or `term:category:description`.
    pub fn domain_hint(&self) -> String {
        format!("{}:{}", self.object_type, self.field)
    }
}

/// Result of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enqueued {
    pub id: JobId,
    pub disposition: super::Disposition,
}

/// A job the processor transitioned into `translating`, with the state it
/// was claimed from so it can be handed back untouched if not processed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub claimed_from: JobState,
}
