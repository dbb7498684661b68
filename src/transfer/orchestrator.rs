//! Batch orchestration: a bounded pool of workers draining a shared unit list.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::api::{ShareSession, TransferService};
use crate::config::TransferConfig;
use crate::download_engine::DownloadEngine;
use crate::error::{Error, Result};
use crate::types::{BatchReport, Event, LogLevel, TransferOutcome, TransferUnit};

use super::context::TransferContext;
use super::progress::{LABEL_ALL_DONE, LABEL_PREPARING, ProgressHub};
use super::task::run_transfer_task;

/// Runs batches of transfer units with bounded concurrency
///
/// One batch at a time; progress, log lines and events go through the shared
/// [`ProgressHub`].
pub struct BatchOrchestrator {
    service: Arc<dyn TransferService>,
    engine: Arc<dyn DownloadEngine>,
    hub: Arc<ProgressHub>,
    settings: TransferConfig,
    parallelism: usize,
    running: AtomicBool,
}

/// State of one batch run, shared by its workers
struct BatchRun {
    ctx: TransferContext,
    units: Vec<TransferUnit>,
    /// Next unclaimed unit index
    cursor: AtomicUsize,
    outcomes: Mutex<Vec<Option<TransferOutcome>>>,
}

/// Clears the running flag when a batch ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl BatchOrchestrator {
    /// Create an orchestrator
    ///
    /// `parallelism` is the number of range requests each local download may use.
    pub fn new(
        service: Arc<dyn TransferService>,
        engine: Arc<dyn DownloadEngine>,
        hub: Arc<ProgressHub>,
        settings: TransferConfig,
        parallelism: usize,
    ) -> Self {
        Self {
            service,
            engine,
            hub,
            settings,
            parallelism,
            running: AtomicBool::new(false),
        }
    }

    /// Returns true while a batch is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a batch with the configured concurrency
    pub async fn run(&self, share: &ShareSession, units: Vec<TransferUnit>) -> Result<BatchReport> {
        self.run_with_concurrency(share, units, self.settings.concurrency)
            .await
    }

    /// Run a batch with `concurrency` workers, returning once every unit is terminal
    ///
    /// Exactly `min(concurrency, units.len())` workers are started. Units are
    /// never retried. Per-unit failures are reported in the returned
    /// [`BatchReport`], not as errors.
    ///
    /// # Errors
    /// - [`Error::Config`] if `concurrency` is 0
    /// - [`Error::BatchInProgress`] if a batch is already running
    pub async fn run_with_concurrency(
        &self,
        share: &ShareSession,
        units: Vec<TransferUnit>,
        concurrency: usize,
    ) -> Result<BatchReport> {
        if concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::BatchInProgress);
        }
        let _guard = RunningGuard(&self.running);

        let hub = &self.hub;
        hub.clear_logs().await;

        let total = units.len();
        if total == 0 {
            tracing::warn!("batch started with no files");
            hub.announce(LogLevel::Warn, "no files to process").await;
            return Ok(BatchReport::default());
        }

        let generation = hub.begin_batch();
        let workers = concurrency.min(total);
        hub.set_progress(0, total, LABEL_PREPARING).await;
        hub.log(
            LogLevel::Info,
            format!(
                "starting batch of {} files, concurrency {}",
                total, workers
            ),
        )
        .await;
        hub.emit(Event::BatchStarted {
            total,
            concurrency: workers,
        });
        tracing::info!(total, workers, "batch transfer started");

        let run = Arc::new(BatchRun {
            ctx: TransferContext {
                share: share.clone(),
                service: Arc::clone(&self.service),
                engine: Arc::clone(&self.engine),
                hub: Arc::clone(&self.hub),
                settings: self.settings.clone(),
                parallelism: self.parallelism,
            },
            outcomes: Mutex::new(vec![None; total]),
            units,
            cursor: AtomicUsize::new(0),
        });

        join_all((0..workers).map(|worker| worker_loop(Arc::clone(&run), worker))).await;

        let outcomes = std::mem::take(&mut *run.outcomes.lock().await);
        let report = BatchReport {
            outcomes: run
                .units
                .iter()
                .cloned()
                .zip(outcomes)
                .map(|(unit, outcome)| {
                    let outcome = outcome.unwrap_or_else(|| TransferOutcome::Failed {
                        reason: "unit was never processed".to_string(),
                    });
                    (unit, outcome)
                })
                .collect(),
        };

        hub.set_progress(total, total, LABEL_ALL_DONE).await;
        hub.announce(
            LogLevel::Success,
            format!("all done, processed {} files", total),
        )
        .await;
        hub.emit(Event::BatchFinished {
            total,
            completed: report.completed(),
            skipped: report.skipped(),
            failed: report.failed(),
        });
        tracing::info!(
            total,
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch transfer finished"
        );
        hub.schedule_reset(generation, self.settings.settle_delay);

        Ok(report)
    }
}

/// Claim units until none are left
async fn worker_loop(run: Arc<BatchRun>, worker: usize) {
    let total = run.units.len();
    loop {
        let index = run.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(unit) = run.units.get(index) else {
            tracing::debug!(worker, "no units left, worker exiting");
            return;
        };

        let outcome = run_transfer_task(&run.ctx, index, total, unit).await;
        run.ctx.hub.emit(Event::TransferFinished {
            index,
            fid: unit.fid.clone(),
            file_name: unit.file_name.clone(),
            outcome: outcome.clone(),
        });
        if let Some(slot) = run.outcomes.lock().await.get_mut(index) {
            *slot = Some(outcome);
        }
        run.ctx.hub.complete_unit(total).await;

        // Pace only when more work is waiting
        if run.cursor.load(Ordering::SeqCst) < total {
            tokio::time::sleep(run.ctx.settings.pacing_delay).await;
        }
    }
}
