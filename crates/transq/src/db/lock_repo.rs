//! Processor lease — the deployment-wide "one batch at a time" flag.
//!
//! Stored as a single row so that processes sharing the database file
//! coordinate through it. Acquisition is one conditional upsert: it
//! succeeds only if nobody holds the lease or the current lease expired.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};

/// Name of the lease row guarding `run_queue`.
pub const QUEUE_LOCK: &str = "queue";

/// Current state of a lease row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Held, but past its expiry: the next acquirer will take it over.
    pub expired: bool,
}

/// Tries to take the lease `name` for `holder` for `ttl`.
/// Returns true if this call now holds the lease.
pub fn try_acquire(
    db: &Database,
    name: &str,
    holder: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let acquired_at = format_timestamp(now);
    let expires_at = format_timestamp(now + ttl);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO processor_lock (name, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
               holder = excluded.holder,
               acquired_at = excluded.acquired_at,
               expires_at = excluded.expires_at
             WHERE processor_lock.holder IS NULL
                OR processor_lock.expires_at <= excluded.acquired_at",
            params![name, holder, acquired_at, expires_at],
        )?;
        Ok(changed == 1)
    })
}

/// Releases the lease if `holder` still owns it.
/// Returns false if it was taken over or already released.
pub fn release(db: &Database, name: &str, holder: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processor_lock SET holder = NULL, acquired_at = NULL, expires_at = NULL
             WHERE name = ?1 AND holder = ?2",
            params![name, holder],
        )?;
        Ok(changed == 1)
    })
}

/// Clears the lease regardless of who holds it.
/// Returns true if a holder was actually removed.
pub fn force_release(db: &Database, name: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processor_lock SET holder = NULL, acquired_at = NULL, expires_at = NULL
             WHERE name = ?1 AND holder IS NOT NULL",
            params![name],
        )?;
        Ok(changed == 1)
    })
}

/// Reads the lease row.
pub fn status(db: &Database, name: &str, now: DateTime<Utc>) -> Result<LockStatus, DatabaseError> {
    let row: Option<(Option<String>, Option<String>, Option<String>)> = db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT holder, acquired_at, expires_at FROM processor_lock WHERE name = ?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?)
    })?;

    let Some((Some(holder), acquired_at, expires_at)) = row else {
        return Ok(LockStatus {
            held: false,
            holder: None,
            acquired_at: None,
            expires_at: None,
            expired: false,
        });
    };

    let acquired_at = acquired_at
        .map(|ts| parse_timestamp("processor_lock", &ts))
        .transpose()?;
    let expires_at = expires_at
        .map(|ts| parse_timestamp("processor_lock", &ts))
        .transpose()?;

    Ok(LockStatus {
        held: true,
        holder: Some(holder),
        acquired_at,
        expired: expires_at.is_some_and(|ts| ts <= now),
        expires_at,
    })
}
