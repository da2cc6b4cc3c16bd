//! Read-only cost estimate over the queue.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::config::{CostConfig, TranslationConfig};
use crate::content::ContentAdapter;
use crate::db::DatabaseError;
use crate::queue::{JobState, QueueStore};
use crate::translator::{billable_chars, Translator, TranslatorRegistry};

static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap());
static RE_SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[/?[A-Za-z][\w-]*(?:\s[^\]]*)?\]").unwrap());
static RE_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:#\d+|#x[0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// States scanned when the caller names none.
pub const DEFAULT_STATES: [JobState; 3] =
    [JobState::Pending, JobState::Outdated, JobState::Translating];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageCost {
    pub jobs: usize,
    pub characters: usize,
    pub words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub jobs_scanned: usize,
    pub characters: usize,
    pub words: usize,
    /// `None` when no translator is configured.
    pub estimated_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub by_language: BTreeMap<String, LanguageCost>,
    /// Jobs whose source text could not be read.
    pub unreadable: usize,
    /// The scan stopped at the job limit with more rows possibly left.
    pub truncated: bool,
}

/// Sums size and provider cost of queued work without touching job state.
pub struct CostEstimator {
    queue: QueueStore,
    content: Arc<dyn ContentAdapter>,
    translator: Option<Arc<dyn Translator>>,
    config: CostConfig,
}

impl CostEstimator {
    pub fn new(
        queue: QueueStore,
        content: Arc<dyn ContentAdapter>,
        translator: Option<Arc<dyn Translator>>,
        config: CostConfig,
    ) -> Self {
        Self {
            queue,
            content,
            translator,
            config,
        }
    }

    /// Builds an estimator using whatever provider the settings select.
    /// An unconfigured provider yields estimates without cost.
    pub fn from_registry(
        queue: QueueStore,
        content: Arc<dyn ContentAdapter>,
        registry: &TranslatorRegistry,
        translation: &TranslationConfig,
        config: CostConfig,
    ) -> Self {
        let translator = match registry.resolve(translation) {
            Ok(translator) => Some(translator),
            Err(e) => {
                log::debug!("Cost estimate without provider pricing: {}", e);
                None
            }
        };
        Self::new(queue, content, translator, config)
    }

    /// Scans the default states up to the configured job limit.
    pub fn estimate(&self) -> Result<CostEstimate, DatabaseError> {
        self.estimate_for(&DEFAULT_STATES, self.config.max_jobs)
    }

    /// Scans jobs in `states`, page by page, up to `max_jobs`.
    pub fn estimate_for(
        &self,
        states: &[JobState],
        max_jobs: usize,
    ) -> Result<CostEstimate, DatabaseError> {
        let page_size = self.config.page_size.max(1);
        let mut estimate = CostEstimate {
            estimated_cost: self.translator.as_ref().map(|_| 0.0),
            provider: self.translator.as_ref().map(|t| t.name().to_string()),
            ..CostEstimate::default()
        };

        let mut offset = 0;
        while estimate.jobs_scanned < max_jobs {
            let want = page_size.min(max_jobs - estimate.jobs_scanned);
            let page = self.queue.get_jobs_for_states(states, want, offset)?;
            let fetched = page.len();

            for job in page {
                estimate.jobs_scanned += 1;
                let lang = estimate
                    .by_language
                    .entry(job.target_language.clone())
                    .or_insert_with(|| LanguageCost {
                        estimated_cost: self.translator.as_ref().map(|_| 0.0),
                        ..LanguageCost::default()
                    });
                lang.jobs += 1;

                let source = match self.content.read_field(job.object(), &job.field) {
                    Ok(text) => text,
                    Err(e) => {
                        log::debug!("Cannot read source of job {}: {}", job.id, e);
                        estimate.unreadable += 1;
                        continue;
                    }
                };
                let text = strip_markup(&source);
                if text.is_empty() {
                    continue;
                }

                let chars = billable_chars(&text);
                let words = text.split_whitespace().count();
                lang.characters += chars;
                lang.words += words;
                estimate.characters += chars;
                estimate.words += words;

                if let Some(translator) = &self.translator {
                    let cost = translator.estimate_cost(&text);
                    lang.estimated_cost = lang.estimated_cost.map(|c| c + cost);
                    estimate.estimated_cost = estimate.estimated_cost.map(|c| c + cost);
                }
            }

            if fetched < want {
                return Ok(estimate);
            }
            offset += fetched;
        }

        estimate.truncated = true;
        Ok(estimate)
    }
}

/// Removes HTML tags, comments, shortcodes and entities, and collapses
/// whitespace, leaving the text a provider would bill for.
pub fn strip_markup(text: &str) -> String {
    let text = RE_TAG.replace_all(text, " ");
    let text = RE_SHORTCODE.replace_all(&text, " ");
    let text = RE_ENTITY.replace_all(&text, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
