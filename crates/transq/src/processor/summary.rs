use serde::Serialize;

/// Aggregate outcome of one processor invocation.
///
/// `claimed == processed + skipped + errors + deferred` for every run that
/// returns normally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub claimed: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Claimed jobs handed back untouched because the batch character
    /// budget ran out.
    pub deferred: usize,
    /// Another run held the processor lock; nothing was claimed.
    pub lock_contended: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub(crate) fn contended() -> Self {
        Self {
            lock_contended: true,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Done => self.processed += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed => self.errors += 1,
            JobOutcome::Deferred => self.deferred += 1,
        }
    }

    /// Whether the run touched nothing.
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}

/// Result of processing one claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Done,
    Skipped,
    Failed,
    Deferred,
}

/// Running character total of a batch.
///
/// The first job that reaches the provider is always admitted, so an
/// oversized single job cannot starve the queue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CharBudget {
    limit: usize,
    used: usize,
}

impl CharBudget {
    /// `limit == 0` means unlimited.
    pub(crate) fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub(crate) fn unlimited() -> Self {
        Self::new(0)
    }

    pub(crate) fn admit(&mut self, chars: usize) -> bool {
        if self.limit > 0 && self.used > 0 && self.used.saturating_add(chars) > self.limit {
            return false;
        }
        self.used = self.used.saturating_add(chars);
        true
    }
}
