//! Periodic queue maintenance.
//!
//! Four independent triggers drive the processor: run the queue, retry
//! failed jobs, resync outdated jobs and purge retained jobs. Each firing
//! is a short-lived blocking invocation; firings may overlap, and the
//! processor lock keeps `run_queue` single-flight.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::SchedulerConfig;
use crate::db::scheduler_repo;
use crate::error::{SchedulerError, TransqError};
use crate::processor::{Processor, RunSummary};

/// A periodic maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    RunQueue,
    RetryFailed,
    ResyncOutdated,
    CleanupQueue,
}

impl Trigger {
    pub const ALL: [Trigger; 4] = [
        Trigger::RunQueue,
        Trigger::RetryFailed,
        Trigger::ResyncOutdated,
        Trigger::CleanupQueue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::RunQueue => "run_queue",
            Trigger::RetryFailed => "retry_failed",
            Trigger::ResyncOutdated => "resync_outdated",
            Trigger::CleanupQueue => "cleanup_queue",
        }
    }

    /// Configured period, or `None` if the trigger is disabled.
    pub fn cadence(&self, config: &SchedulerConfig) -> Option<Duration> {
        SchedulerConfig::to_duration(self.cadence_secs(config))
    }

    fn cadence_secs(&self, config: &SchedulerConfig) -> u64 {
        match self {
            Trigger::RunQueue => config.run_queue_secs,
            Trigger::RetryFailed => config.retry_failed_secs,
            Trigger::ResyncOutdated => config.resync_outdated_secs,
            Trigger::CleanupQueue => config.cleanup_queue_secs,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trigger '{}'", s))
    }
}

/// What one firing did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FireOutcome {
    Queue(RunSummary),
    Reset { jobs: usize },
    Cleaned { jobs: usize },
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Fire(Trigger),
    Shutdown,
}

/// Drives the processor on the configured cadences.
pub struct Scheduler {
    processor: Arc<Processor>,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    commands: broadcast::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(processor: Arc<Processor>) -> Self {
        let config = processor.settings().scheduler.clone();
        Self::with_config(processor, config)
    }

    pub fn with_config(processor: Arc<Processor>, config: SchedulerConfig) -> Self {
        let (commands, _) = broadcast::channel(16);
        Self {
            processor,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            commands,
            handle: Mutex::new(None),
        }
    }

    /// Runs one trigger synchronously on the calling thread, for hosts that
    /// drive cadence themselves (cron, an admin action).
    pub fn fire(&self, trigger: Trigger) -> Result<FireOutcome, TransqError> {
        execute(&self.processor, trigger)
    }

    /// Starts the background loop.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock().map_err(|_| SchedulerError::Panicked)?;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }
        if let Some(finished) = handle.take() {
            finished.join().map_err(|_| SchedulerError::Panicked)?;
        }
        for trigger in Trigger::ALL {
            let secs = trigger.cadence_secs(&self.config);
            if secs > SchedulerConfig::MAX_CADENCE_SECS {
                return Err(SchedulerError::InvalidCadence {
                    trigger: trigger.to_string(),
                    secs,
                    max: SchedulerConfig::MAX_CADENCE_SECS,
                });
            }
        }
        self.shutdown.store(false, Ordering::Release);

        let processor = Arc::clone(&self.processor);
        let shutdown = Arc::clone(&self.shutdown);
        let config = self.config.clone();
        let commands = self.commands.subscribe();

        let spawned = std::thread::Builder::new()
            .name("transq-scheduler".to_string())
            .spawn(move || run_loop(processor, config, shutdown, commands))
            .map_err(SchedulerError::Spawn)?;
        *handle = Some(spawned);

        let enabled: Vec<&str> = Trigger::ALL
            .iter()
            .filter(|t| t.cadence(&self.config).is_some())
            .map(Trigger::as_str)
            .collect();
        log::info!("Scheduler started with triggers {:?}", enabled);
        Ok(())
    }

    /// Requests a firing from the background loop. Returns false if the
    /// loop is not running.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        self.commands.send(Command::Fire(trigger)).is_ok()
    }

    /// Whether the background loop is alive. A loop that exited on its
    /// own (e.g. its runtime failed to build) counts as stopped.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|handle| handle.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Signals the loop to stop and waits for it and any in-flight firing
    /// to finish.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);

        let handle = self
            .handle
            .lock()
            .map_err(|_| SchedulerError::Panicked)?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| SchedulerError::Panicked)?;
            log::info!("Scheduler stopped");
        }
        Ok(())
    }
}

/// Interval for an enabled trigger. A period too large to schedule leaves
/// the trigger disabled.
fn timer(trigger: Trigger, period: Option<Duration>) -> Option<Interval> {
    let period = period?;
    let Some(start) = tokio::time::Instant::now().checked_add(period) else {
        log::warn!(
            "Cadence of {} ({}s) is out of range, trigger disabled",
            trigger,
            period.as_secs()
        );
        return None;
    };
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(interval)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn run_loop(
    processor: Arc<Processor>,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
    mut commands: broadcast::Receiver<Command>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to build scheduler runtime: {}", e);
            return;
        }
    };

    rt.block_on(async {
        let mut run_queue = timer(Trigger::RunQueue, Trigger::RunQueue.cadence(&config));
        let mut retry_failed = timer(Trigger::RetryFailed, Trigger::RetryFailed.cadence(&config));
        let mut resync_outdated = timer(Trigger::ResyncOutdated, Trigger::ResyncOutdated.cadence(&config));
        let mut cleanup_queue = timer(Trigger::CleanupQueue, Trigger::CleanupQueue.cadence(&config));

        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            let trigger = tokio::select! {
                _ = tick(&mut run_queue) => Trigger::RunQueue,
                _ = tick(&mut retry_failed) => Trigger::RetryFailed,
                _ = tick(&mut resync_outdated) => Trigger::ResyncOutdated,
                _ = tick(&mut cleanup_queue) => Trigger::CleanupQueue,
                command = commands.recv() => match command {
                    Ok(Command::Fire(trigger)) => {
                        log::info!("Manual {} triggered", trigger);
                        trigger
                    }
                    Ok(Command::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Scheduler dropped {} manual trigger(s)", missed);
                        continue;
                    }
                },
            };

            if shutdown.load(Ordering::Acquire) {
                break;
            }

            let processor = Arc::clone(&processor);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = execute(&processor, trigger) {
                    log::error!("Scheduled {} failed: {}", trigger, e);
                }
            });
        }
    });

    // Dropping the runtime waits for in-flight firings.
    drop(rt);
}

/// Runs one trigger and records it in the run log.
fn execute(processor: &Processor, trigger: Trigger) -> Result<FireOutcome, TransqError> {
    let db = processor.queue().database();
    scheduler_repo::record_start(db, trigger.as_str(), Utc::now())?;

    let result: Result<FireOutcome, TransqError> = match trigger {
        Trigger::RunQueue => processor
            .run_queue()
            .map(FireOutcome::Queue)
            .map_err(Into::into),
        Trigger::RetryFailed => processor
            .retry_failed_jobs()
            .map(|jobs| FireOutcome::Reset { jobs })
            .map_err(Into::into),
        Trigger::ResyncOutdated => processor
            .resync_outdated_jobs()
            .map(|jobs| FireOutcome::Reset { jobs })
            .map_err(Into::into),
        Trigger::CleanupQueue => processor
            .cleanup_queue()
            .map(|jobs| FireOutcome::Cleaned { jobs })
            .map_err(Into::into),
    };

    let (outcome, error) = match &result {
        Ok(FireOutcome::Queue(summary)) if summary.lock_contended => ("contended", None),
        Ok(_) => ("ok", None),
        Err(e) => ("failed", Some(e.to_string())),
    };
    if let Err(e) =
        scheduler_repo::record_finish(db, trigger.as_str(), outcome, error.as_deref(), Utc::now())
    {
        log::warn!("Failed to record {} run: {}", trigger, e);
    }

    result
}
