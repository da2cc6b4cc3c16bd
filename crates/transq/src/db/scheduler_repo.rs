//! Scheduler run log — last start/finish of each periodic trigger.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// Last recorded run of one trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRun {
    pub trigger_name: String,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub run_count: u64,
}

fn parse_optional(value: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value
        .map(|ts| parse_timestamp("scheduler_runs", &ts))
        .transpose()
}

type RawRun = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    u64,
);

fn raw_run(r: &Row<'_>) -> Result<RawRun, rusqlite::Error> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
    ))
}

fn into_run(raw: RawRun) -> Result<TriggerRun, DatabaseError> {
    let (trigger_name, started, finished, last_outcome, last_error, run_count) = raw;
    Ok(TriggerRun {
        trigger_name,
        last_started_at: parse_optional(started)?,
        last_finished_at: parse_optional(finished)?,
        last_outcome,
        last_error,
        run_count,
    })
}

/// Records that `trigger` started running.
pub fn record_start(db: &Database, trigger: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scheduler_runs (trigger_name, last_started_at, run_count)
             VALUES (?1, ?2, 1)
             ON CONFLICT(trigger_name) DO UPDATE SET
               last_started_at = excluded.last_started_at,
               run_count = run_count + 1",
            params![trigger, now],
        )?;
        Ok(())
    })
}

/// Records how a run of `trigger` finished. `error` is cleared on success.
pub fn record_finish(
    db: &Database,
    trigger: &str,
    outcome: &str,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO scheduler_runs (trigger_name, last_finished_at, last_outcome, last_error)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(trigger_name) DO UPDATE SET
               last_finished_at = excluded.last_finished_at,
               last_outcome = excluded.last_outcome,
               last_error = excluded.last_error",
            params![trigger, now, outcome, error],
        )?;
        Ok(())
    })
}

/// Returns the run record of one trigger.
pub fn find(db: &Database, trigger: &str) -> Result<Option<TriggerRun>, DatabaseError> {
    let raw = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT trigger_name, last_started_at, last_finished_at, last_outcome,
                 last_error, run_count FROM scheduler_runs WHERE trigger_name = ?1",
                params![trigger],
                raw_run,
            )
            .optional()?)
    })?;
    raw.map(into_run).transpose()
}

/// Returns the run records of all triggers that ever ran.
pub fn list(db: &Database) -> Result<Vec<TriggerRun>, DatabaseError> {
    let raw = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT trigger_name, last_started_at, last_finished_at, last_outcome,
             last_error, run_count FROM scheduler_runs ORDER BY trigger_name",
        )?;
        let rows = stmt
            .query_map([], raw_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    raw.into_iter().map(into_run).collect()
}
