//! Source/translation object pairs.

use chrono::Utc;

use crate::content::{ObjectId, ObjectRef};
use crate::db::pair_repo::{self, LegacyMigration, TranslationPair};
use crate::db::{Database, DatabaseError};

/// Persistent back-references between source objects and their
/// per-language translation objects.
#[derive(Clone)]
pub struct PairStore {
    db: Database,
}

impl PairStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// See [`pair_repo::link`]. Returns the id that holds the link.
    pub fn link(
        &self,
        source: ObjectRef,
        language: &str,
        translation_id: ObjectId,
        replacing: Option<ObjectId>,
    ) -> Result<ObjectId, DatabaseError> {
        pair_repo::link(&self.db, source, language, translation_id, replacing, Utc::now())
    }

    pub fn translation_for(
        &self,
        source: ObjectRef,
        language: &str,
    ) -> Result<Option<ObjectId>, DatabaseError> {
        pair_repo::translation_for(&self.db, source, language)
    }

    pub fn source_of(
        &self,
        translation: ObjectRef,
    ) -> Result<Option<(ObjectId, String)>, DatabaseError> {
        pair_repo::source_of(&self.db, translation)
    }

    pub fn pairs_for_source(&self, source: ObjectRef) -> Result<Vec<TranslationPair>, DatabaseError> {
        pair_repo::pairs_for_source(&self.db, source)
    }

    /// Forgets the pair of a translation object the host deleted.
    pub fn unlink_translation(&self, translation: ObjectRef) -> Result<bool, DatabaseError> {
        Ok(pair_repo::unlink_translation(&self.db, translation)? > 0)
    }

    pub fn import_legacy_default(
        &self,
        source: ObjectRef,
        translation_id: ObjectId,
    ) -> Result<(), DatabaseError> {
        pair_repo::import_legacy_default(&self.db, source, translation_id, Utc::now())
    }

    pub fn count_legacy(&self) -> Result<u64, DatabaseError> {
        pair_repo::count_legacy(&self.db)
    }

    /// One-time pass qualifying legacy unqualified pairs with the
    /// deployment's first configured target language.
    pub fn migrate_legacy_pairs(&self, first_language: &str) -> Result<LegacyMigration, DatabaseError> {
        let result = pair_repo::migrate_legacy(&self.db, first_language, Utc::now())?;
        if result.migrated > 0 || result.dropped > 0 {
            log::info!(
                "Migrated {} legacy translation pair(s) to '{}', dropped {} superseded",
                result.migrated,
                first_language,
                result.dropped
            );
        }
        Ok(result)
    }
}
