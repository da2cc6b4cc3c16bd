//! Wiring of the queue components for a host process.

use std::sync::Arc;

use crate::config::Settings;
use crate::content::ContentAdapter;
use crate::cost::CostEstimator;
use crate::db::Database;
use crate::diagnostics::Diagnostics;
use crate::error::{ConfigError, Result};
use crate::processor::Processor;
use crate::scheduler::Scheduler;
use crate::translator::TranslatorRegistry;

/// The processor, scheduler and reporting surfaces over one database.
pub struct Transq {
    processor: Arc<Processor>,
    scheduler: Scheduler,
}

impl Transq {
    /// Opens the configured database and runs the one-time legacy pair
    /// migration.
    pub fn open(
        settings: Settings,
        content: Arc<dyn ContentAdapter>,
        translators: TranslatorRegistry,
    ) -> Result<Self> {
        let path = settings
            .resolved_database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "No database path configured and no home directory found".to_string(),
            })?;
        let db = Database::open(&path)?;
        Self::with_database(db, settings, content, translators)
    }

    pub fn with_database(
        db: Database,
        settings: Settings,
        content: Arc<dyn ContentAdapter>,
        translators: TranslatorRegistry,
    ) -> Result<Self> {
        crate::config::validate_settings(&settings)?;
        let processor = Arc::new(Processor::new(db, content, translators, Arc::new(settings)));
        processor.migrate_legacy_pairs()?;
        let scheduler = Scheduler::new(Arc::clone(&processor));
        Ok(Self {
            processor,
            scheduler,
        })
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(Arc::clone(&self.processor))
    }

    pub fn cost_estimator(&self) -> CostEstimator {
        let settings = self.processor.settings();
        CostEstimator::from_registry(
            self.processor.queue().clone(),
            Arc::clone(self.processor.content()),
            self.processor.translators(),
            &settings.translation,
            settings.cost.clone(),
        )
    }
}
