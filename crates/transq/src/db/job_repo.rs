//! Job repository — all reads and writes of the `jobs` table.
//!
//! Every state transition is a conditional `UPDATE ... WHERE state = ?`,
//! so two writers (threads or processes) can never both move the same row
//! out of the same state.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::content::{FieldRef, ObjectRef, ObjectType};
use crate::queue::change_detector::{self, Disposition};
use crate::queue::{ClaimedJob, DateColumn, Enqueued, Job, JobState};

const JOB_COLUMNS: &str = "id, object_type, object_id, field_kind, field_name, field_taxonomy,
     target_language, content_hash, state, attempts, last_error, created_at, updated_at";

/// A raw job row, before mapping columns to domain types.
struct JobRow {
    id: String,
    object_type: String,
    object_id: i64,
    field_kind: String,
    field_name: String,
    field_taxonomy: String,
    target_language: String,
    content_hash: String,
    state: String,
    attempts: u32,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            object_type: row.get("object_type")?,
            object_id: row.get("object_id")?,
            field_kind: row.get("field_kind")?,
            field_name: row.get("field_name")?,
            field_taxonomy: row.get("field_taxonomy")?,
            target_language: row.get("target_language")?,
            content_hash: row.get("content_hash")?,
            state: row.get("state")?,
            attempts: row.get("attempts")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn into_job(self) -> Result<Job, DatabaseError> {
        let corrupt = |reason: String| DatabaseError::CorruptRow {
            table: "jobs",
            reason,
        };
        Ok(Job {
            object_type: self.object_type.parse::<ObjectType>().map_err(corrupt)?,
            field: FieldRef::from_columns(&self.field_kind, self.field_name, self.field_taxonomy)
                .map_err(corrupt)?,
            state: self.state.parse::<JobState>().map_err(corrupt)?,
            created_at: parse_timestamp("jobs", &self.created_at)?,
            updated_at: parse_timestamp("jobs", &self.updated_at)?,
            id: self.id,
            object_id: self.object_id,
            target_language: self.target_language,
            content_hash: self.content_hash,
            attempts: self.attempts,
            last_error: self.last_error,
        })
    }
}

fn query_jobs(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Builds `?n, ?n+1, ...` for an `IN (...)` list starting at parameter `first`.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn state_params(states: &[JobState]) -> Vec<&'static str> {
    states.iter().map(JobState::as_str).collect()
}

/// Upserts the job for `(object, field, language)`.
///
/// Runs the read, the change detection and the write inside one
/// `IMMEDIATE` transaction, so concurrent enqueues of the same tuple from
/// other connections serialize instead of racing.
pub fn enqueue(
    db: &Database,
    object: ObjectRef,
    field: &FieldRef,
    language: &str,
    hash: &str,
    now: DateTime<Utc>,
) -> Result<Enqueued, DatabaseError> {
    let (kind, name, taxonomy) = field.to_columns();
    let now = format_timestamp(now);

    db.with_conn(|conn| {
        let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        let existing: Option<(String, String, String)> = tx
            .query_row(
                "SELECT id, state, content_hash FROM jobs
                 WHERE object_type = ?1 AND object_id = ?2 AND field_kind = ?3
                   AND field_taxonomy = ?4 AND field_name = ?5 AND target_language = ?6",
                params![object.object_type.as_str(), object.id, kind, taxonomy, name, language],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let existing = match existing {
            Some((id, state, stored_hash)) => {
                let state = state
                    .parse::<JobState>()
                    .map_err(|reason| DatabaseError::CorruptRow {
                        table: "jobs",
                        reason,
                    })?;
                Some((id, state, stored_hash))
            }
            None => None,
        };

        let disposition = change_detector::detect(
            existing
                .as_ref()
                .map(|(_, state, stored)| (*state, stored.as_str())),
            hash,
        );

        let id = match existing {
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO jobs (id, object_type, object_id, field_kind, field_name,
                     field_taxonomy, target_language, content_hash, state, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)",
                    params![
                        id,
                        object.object_type.as_str(),
                        object.id,
                        kind,
                        name,
                        taxonomy,
                        language,
                        hash,
                        now
                    ],
                )?;
                id
            }
            Some((id, _, _)) => {
                match disposition {
                    Disposition::MarkOutdated => {
                        tx.execute(
                            "UPDATE jobs SET state = 'outdated', content_hash = ?2, updated_at = ?3
                             WHERE id = ?1 AND state = 'done'",
                            params![id, hash, now],
                        )?;
                    }
                    Disposition::UpdateHashOnly => {
                        tx.execute(
                            "UPDATE jobs SET content_hash = ?2, updated_at = ?3 WHERE id = ?1",
                            params![id, hash, now],
                        )?;
                    }
                    Disposition::NoOp | Disposition::CreatePending => {}
                }
                id
            }
        };

        tx.commit()?;
        Ok(Enqueued { id, disposition })
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        Ok(query_jobs(conn, &sql, params![id])?.into_iter().next())
    })
}

/// Finds the job for an `(object, field, language)` tuple.
pub fn find_by_tuple(
    db: &Database,
    object: ObjectRef,
    field: &FieldRef,
    language: &str,
) -> Result<Option<Job>, DatabaseError> {
    let (kind, name, taxonomy) = field.to_columns();
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs
             WHERE object_type = ?1 AND object_id = ?2 AND field_kind = ?3
               AND field_taxonomy = ?4 AND field_name = ?5 AND target_language = ?6",
            JOB_COLUMNS
        );
        let jobs = query_jobs(
            conn,
            &sql,
            params![object.object_type.as_str(), object.id, kind, taxonomy, name, language],
        )?;
        Ok(jobs.into_iter().next())
    })
}

/// Returns every job of one content object, oldest first.
pub fn find_for_object(db: &Database, object: ObjectRef) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs WHERE object_type = ?1 AND object_id = ?2
             ORDER BY created_at ASC, rowid ASC",
            JOB_COLUMNS
        );
        query_jobs(conn, &sql, params![object.object_type.as_str(), object.id])
    })
}

/// Returns a page of jobs in any of `states`, oldest `created_at` first.
///
/// Ties are broken by insertion order so a given offset always yields the
/// same rows while the underlying data is unchanged.
pub fn get_jobs_for_states(
    db: &Database,
    states: &[JobState],
    limit: usize,
    offset: usize,
) -> Result<Vec<Job>, DatabaseError> {
    if states.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    db.with_conn(|conn| {
        let names = state_params(states);
        let sql = format!(
            "SELECT {} FROM jobs WHERE state IN ({})
             ORDER BY created_at ASC, rowid ASC LIMIT ?{} OFFSET ?{}",
            JOB_COLUMNS,
            placeholders(1, names.len()),
            names.len() + 1,
            names.len() + 2
        );
        let limit = limit as i64;
        let offset = offset as i64;
        let mut params: Vec<&dyn ToSql> = names.iter().map(|s| s as &dyn ToSql).collect();
        params.push(&limit);
        params.push(&offset);
        query_jobs(conn, &sql, &params)
    })
}

/// Returns the number of jobs per state. Every state is present, with 0
/// for states that have no rows.
pub fn get_state_counts(db: &Database) -> Result<BTreeMap<JobState, u64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut counts: BTreeMap<JobState, u64> =
            JobState::ALL.iter().map(|s| (*s, 0)).collect();
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (state, count) in rows {
            let state = state
                .parse::<JobState>()
                .map_err(|reason| DatabaseError::CorruptRow {
                    table: "jobs",
                    reason,
                })?;
            counts.insert(state, count);
        }
        Ok(counts)
    })
}

/// Counts jobs in the given state.
pub fn count_by_state(db: &Database, state: JobState) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE state = ?1",
            params![state.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts `done` jobs of an object type, optionally restricted to one field.
pub fn count_completed_jobs(
    db: &Database,
    object_type: ObjectType,
    field: Option<&FieldRef>,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = match field {
            Some(field) => {
                let (kind, name, taxonomy) = field.to_columns();
                conn.query_row(
                    "SELECT COUNT(*) FROM jobs WHERE state = 'done' AND object_type = ?1
                     AND field_kind = ?2 AND field_name = ?3 AND field_taxonomy = ?4",
                    params![object_type.as_str(), kind, name, taxonomy],
                    |r| r.get(0),
                )?
            }
            None => conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE state = 'done' AND object_type = ?1",
                params![object_type.as_str()],
                |r| r.get(0),
            )?,
        };
        Ok(count)
    })
}

/// Moves every job in `states` back to `pending`. Returns the number of
/// rows that actually changed state.
pub fn reset_states(
    db: &Database,
    states: &[JobState],
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let states: Vec<JobState> = states
        .iter()
        .copied()
        .filter(|s| *s != JobState::Pending)
        .collect();
    if states.is_empty() {
        return Ok(0);
    }
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let names = state_params(&states);
        let sql = format!(
            "UPDATE jobs SET state = 'pending', updated_at = ?1 WHERE state IN ({})",
            placeholders(2, names.len())
        );
        let mut params: Vec<&dyn ToSql> = vec![&now];
        params.extend(names.iter().map(|s| s as &dyn ToSql));
        Ok(conn.execute(&sql, params.as_slice())?)
    })
}

/// Returns the job with the smallest `column` among `states`.
pub fn get_oldest_job_for_states(
    db: &Database,
    states: &[JobState],
    column: DateColumn,
) -> Result<Option<Job>, DatabaseError> {
    if states.is_empty() {
        return Ok(None);
    }
    db.with_conn(|conn| {
        let names = state_params(states);
        let sql = format!(
            "SELECT {} FROM jobs WHERE state IN ({}) ORDER BY {} ASC, rowid ASC LIMIT 1",
            JOB_COLUMNS,
            placeholders(1, names.len()),
            column.column()
        );
        let params: Vec<&dyn ToSql> = names.iter().map(|s| s as &dyn ToSql).collect();
        Ok(query_jobs(conn, &sql, &params)?.into_iter().next())
    })
}

fn age_filter(states: &[JobState], column: DateColumn) -> String {
    format!(
        "state IN ({}) AND {} < ?{}",
        placeholders(1, states.len()),
        column.column(),
        states.len() + 1
    )
}

/// `None` when the cutoff predates the representable range, in which case
/// no row can be old enough.
fn cutoff(days: u32, now: DateTime<Utc>) -> Option<String> {
    Duration::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .map(format_timestamp)
}

/// Counts jobs in `states` whose `column` is more than `days` days old.
pub fn count_old_jobs(
    db: &Database,
    states: &[JobState],
    days: u32,
    column: DateColumn,
    now: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    let Some(cutoff) = cutoff(days, now).filter(|_| !states.is_empty()) else {
        return Ok(0);
    };
    db.with_conn(|conn| {
        let names = state_params(states);
        let sql = format!(
            "SELECT COUNT(*) FROM jobs WHERE {}",
            age_filter(states, column)
        );
        let mut params: Vec<&dyn ToSql> = names.iter().map(|s| s as &dyn ToSql).collect();
        params.push(&cutoff);
        let count: u64 = conn.query_row(&sql, params.as_slice(), |r| r.get(0))?;
        Ok(count)
    })
}

/// Deletes jobs in `states` whose `column` is more than `days` days old.
/// Returns the number of rows deleted.
pub fn cleanup_old_jobs(
    db: &Database,
    states: &[JobState],
    days: u32,
    column: DateColumn,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let Some(cutoff) = cutoff(days, now).filter(|_| !states.is_empty()) else {
        return Ok(0);
    };
    db.with_conn(|conn| {
        let names = state_params(states);
        let sql = format!("DELETE FROM jobs WHERE {}", age_filter(states, column));
        let mut params: Vec<&dyn ToSql> = names.iter().map(|s| s as &dyn ToSql).collect();
        params.push(&cutoff);
        Ok(conn.execute(&sql, params.as_slice())?)
    })
}

/// Atomically moves one job from `expected` into `translating`.
/// Returns false if the job is no longer in `expected`.
pub fn claim(
    db: &Database,
    id: &str,
    expected: JobState,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| claim_on(conn, id, expected, &now))
}

fn claim_on(
    conn: &Connection,
    id: &str,
    expected: JobState,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET state = 'translating', attempts = attempts + 1, updated_at = ?3
         WHERE id = ?1 AND state = ?2",
        params![id, expected.as_str(), now],
    )?;
    Ok(changed == 1)
}

/// Claims up to `limit` of the oldest `pending`/`outdated` jobs.
///
/// Candidates taken by a concurrent claimer between the read and the
/// conditional update are simply skipped.
pub fn claim_batch(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<ClaimedJob>, DatabaseError> {
    let candidates = get_jobs_for_states(db, &JobState::CLAIMABLE, limit, 0)?;
    let now_ts = format_timestamp(now);
    db.with_conn(|conn| {
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut job in candidates {
            if claim_on(conn, &job.id, job.state, &now_ts)? {
                let claimed_from = job.state;
                job.state = JobState::Translating;
                job.attempts += 1;
                job.updated_at = now;
                claimed.push(ClaimedJob { job, claimed_from });
            } else {
                log::debug!("Job {} was claimed elsewhere, skipping", job.id);
            }
        }
        Ok(claimed)
    })
}

/// Completes a `translating` job that was translated from `hash_used`.
///
/// Lands in `done` if the stored hash still matches, or in `outdated` if
/// an enqueue changed the hash while the translation was in flight.
/// Returns `None` if the job is no longer `translating`.
pub fn mark_done(
    db: &Database,
    id: &str,
    hash_used: &str,
    now: DateTime<Utc>,
) -> Result<Option<JobState>, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let state: Option<String> = conn
            .query_row(
                "UPDATE jobs
                 SET state = CASE WHEN content_hash = ?2 THEN 'done' ELSE 'outdated' END,
                     last_error = NULL, updated_at = ?3
                 WHERE id = ?1 AND state = 'translating'
                 RETURNING state",
                params![id, hash_used, now],
                |r| r.get(0),
            )
            .optional()?;
        state
            .map(|s| {
                s.parse::<JobState>()
                    .map_err(|reason| DatabaseError::CorruptRow {
                        table: "jobs",
                        reason,
                    })
            })
            .transpose()
    })
}

/// Moves a `translating` job to `error` with a diagnostic message.
pub fn mark_error(
    db: &Database,
    id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'error', last_error = ?2, updated_at = ?3
             WHERE id = ?1 AND state = 'translating'",
            params![id, message, now],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a `translating` job to `skipped` (nothing to translate).
pub fn mark_skipped(db: &Database, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'skipped', last_error = NULL, updated_at = ?2
             WHERE id = ?1 AND state = 'translating'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Hands a claimed but unprocessed job back to the state it was claimed
/// from, undoing the attempt count of the claim.
pub fn release_claim(
    db: &Database,
    id: &str,
    back_to: JobState,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = ?2, attempts = MAX(attempts - 1, 0), updated_at = ?3
             WHERE id = ?1 AND state = 'translating'",
            params![id, back_to.as_str(), now],
        )?;
        Ok(changed == 1)
    })
}

/// Returns the most recently failed jobs, newest first.
pub fn recent_errors(db: &Database, limit: usize) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs WHERE state = 'error'
             ORDER BY updated_at DESC, rowid DESC LIMIT ?1",
            JOB_COLUMNS
        );
        query_jobs(conn, &sql, params![limit as i64])
    })
}
