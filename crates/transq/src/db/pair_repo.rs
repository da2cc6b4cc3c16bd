//! Translation pair repository — source/translation back-references.
//!
//! A row links a source object to its translation object for one target
//! language. Rows written by legacy single-language deployments carry no
//! language; they are never read as pairs until [`migrate_legacy`]
//! qualifies them.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use super::{format_timestamp, Database, DatabaseError};
use crate::content::{ObjectId, ObjectRef, ObjectType};

/// A source object and its translation counterpart in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPair {
    pub object_type: ObjectType,
    pub source_id: ObjectId,
    pub language: String,
    pub translation_id: ObjectId,
}

/// Outcome of the legacy migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMigration {
    /// Legacy rows converted into qualified pairs.
    pub migrated: usize,
    /// Legacy rows discarded because a qualified pair already existed.
    pub dropped: usize,
}

/// Links `source` to `translation_id` for `language` unless another
/// object already holds the link.
///
/// An existing link is replaced only when it still points at `replacing`,
/// the object the caller found missing. Returns the id that holds the link
/// afterwards: `translation_id` if it was written, the existing id if a
/// concurrent writer linked first.
pub fn link(
    db: &Database,
    source: ObjectRef,
    language: &str,
    translation_id: ObjectId,
    replacing: Option<ObjectId>,
    now: DateTime<Utc>,
) -> Result<ObjectId, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let current: Option<ObjectId> = tx
            .query_row(
                "SELECT translation_id FROM translation_pairs
                 WHERE object_type = ?1 AND source_id = ?2 AND language = ?3",
                params![source.object_type.as_str(), source.id, language],
                |r| r.get(0),
            )
            .optional()?;
        let linked = match current {
            None => {
                tx.execute(
                    "INSERT INTO translation_pairs
                     (object_type, source_id, language, translation_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![
                        source.object_type.as_str(),
                        source.id,
                        language,
                        translation_id,
                        now
                    ],
                )?;
                translation_id
            }
            Some(existing) if Some(existing) == replacing && existing != translation_id => {
                tx.execute(
                    "UPDATE translation_pairs SET translation_id = ?4, updated_at = ?5
                     WHERE object_type = ?1 AND source_id = ?2 AND language = ?3",
                    params![
                        source.object_type.as_str(),
                        source.id,
                        language,
                        translation_id,
                        now
                    ],
                )?;
                translation_id
            }
            Some(existing) => existing,
        };
        tx.commit()?;
        Ok(linked)
    })
}

/// Returns the translation object id of `source` for `language`.
pub fn translation_for(
    db: &Database,
    source: ObjectRef,
    language: &str,
) -> Result<Option<ObjectId>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT translation_id FROM translation_pairs
                 WHERE object_type = ?1 AND source_id = ?2 AND language = ?3",
                params![source.object_type.as_str(), source.id, language],
                |r| r.get(0),
            )
            .optional()?)
    })
}

/// Returns the source object id and language of a translation object.
pub fn source_of(
    db: &Database,
    translation: ObjectRef,
) -> Result<Option<(ObjectId, String)>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT source_id, language FROM translation_pairs
                 WHERE object_type = ?1 AND translation_id = ?2 AND language IS NOT NULL",
                params![translation.object_type.as_str(), translation.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?)
    })
}

/// Returns every qualified pair of `source`, ordered by language.
pub fn pairs_for_source(
    db: &Database,
    source: ObjectRef,
) -> Result<Vec<TranslationPair>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT source_id, language, translation_id FROM translation_pairs
             WHERE object_type = ?1 AND source_id = ?2 AND language IS NOT NULL
             ORDER BY language",
        )?;
        let pairs = stmt
            .query_map(params![source.object_type.as_str(), source.id], |r| {
                Ok(TranslationPair {
                    object_type: source.object_type,
                    source_id: r.get(0)?,
                    language: r.get(1)?,
                    translation_id: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    })
}

/// Removes the pair pointing at a deleted translation object.
pub fn unlink_translation(db: &Database, translation: ObjectRef) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM translation_pairs WHERE object_type = ?1 AND translation_id = ?2",
            params![translation.object_type.as_str(), translation.id],
        )?)
    })
}

/// Records an unqualified "default translation" reference imported from
/// a legacy single-language deployment.
pub fn import_legacy_default(
    db: &Database,
    source: ObjectRef,
    translation_id: ObjectId,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM translation_pairs
             WHERE object_type = ?1 AND source_id = ?2 AND language IS NULL",
            params![source.object_type.as_str(), source.id],
        )?;
        tx.execute(
            "INSERT INTO translation_pairs
             (object_type, source_id, language, translation_id, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?4)",
            params![source.object_type.as_str(), source.id, translation_id, now],
        )?;
        tx.commit()?;
        Ok(())
    })
}

/// Counts legacy rows still awaiting migration.
pub fn count_legacy(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM translation_pairs WHERE language IS NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Qualifies every legacy row with `first_language`.
///
/// A legacy row whose source already has a qualified pair for that
/// language is dropped: the qualified pair is the newer record.
pub fn migrate_legacy(
    db: &Database,
    first_language: &str,
    now: DateTime<Utc>,
) -> Result<LegacyMigration, DatabaseError> {
    let now = format_timestamp(now);
    db.with_conn(|conn| {
        let tx = rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let dropped = tx.execute(
            "DELETE FROM translation_pairs
             WHERE language IS NULL AND EXISTS (
                 SELECT 1 FROM translation_pairs AS q
                 WHERE q.object_type = translation_pairs.object_type
                   AND q.source_id = translation_pairs.source_id
                   AND q.language = ?1)",
            params![first_language],
        )?;
        let migrated = tx.execute(
            "UPDATE translation_pairs SET language = ?1, updated_at = ?2 WHERE language IS NULL",
            params![first_language, now],
        )?;
        tx.commit()?;
        Ok(LegacyMigration { migrated, dropped })
    })
}
