//! Shared batch progress, user-facing log lines, and active local downloads.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};

use crate::types::{
    ActiveDownload, DownloadId, DownloadPhase, DownloadProgressUpdate, Event, LogEntry, LogLevel,
    ProgressState,
};

/// Oldest log lines are dropped beyond this many
const MAX_LOG_ENTRIES: usize = 1000;

/// Label shown while a batch is being prepared
pub(crate) const LABEL_PREPARING: &str = "preparing...";

/// Label shown once every unit reached a terminal state
pub(crate) const LABEL_ALL_DONE: &str = "all done";

/// State shared by the batch orchestrator, the download engine and the facade
///
/// Every mutation is mirrored as an [`Event`] on the broadcast channel, so
/// subscribers never need to poll.
pub struct ProgressHub {
    event_tx: broadcast::Sender<Event>,
    progress: Mutex<ProgressState>,
    logs: Mutex<VecDeque<LogEntry>>,
    active: Mutex<HashMap<DownloadId, ActiveDownload>>,
    /// Bumped whenever a batch starts; a pending progress reset only fires if unchanged
    generation: AtomicU64,
    next_download_id: AtomicU64,
    finished_linger: Duration,
}

impl ProgressHub {
    /// Create a hub publishing on `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>, finished_linger: Duration) -> Self {
        Self {
            event_tx,
            progress: Mutex::new(ProgressState::default()),
            logs: Mutex::new(VecDeque::new()),
            active: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            next_download_id: AtomicU64::new(1),
            finished_linger,
        }
    }

    /// Subscribe to the hub's events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Send an event, ignoring the no-subscriber case
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    // -----------------------------------------------------------------------
    // Log lines
    // -----------------------------------------------------------------------

    /// Add a user-facing log line (newest first)
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        {
            let mut logs = self.logs.lock().await;
            logs.push_front(entry.clone());
            logs.truncate(MAX_LOG_ENTRIES);
        }
        self.emit(Event::Log { entry });
    }

    /// Publish a transient notification
    pub fn notify(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(Event::Notification {
            level,
            message: message.into(),
        });
    }

    /// Log a line and publish it as a notification
    pub async fn announce(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.log(level, message.clone()).await;
        self.notify(level, message);
    }

    /// Snapshot of the log, newest first
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().await.iter().cloned().collect()
    }

    pub(crate) async fn clear_logs(&self) {
        self.logs.lock().await.clear();
    }

    // -----------------------------------------------------------------------
    // Batch progress
    // -----------------------------------------------------------------------

    /// Current aggregate progress
    pub async fn progress(&self) -> ProgressState {
        self.progress.lock().await.clone()
    }

    pub(crate) async fn set_progress(&self, done: usize, total: usize, label: &str) {
        let state = ProgressState {
            done,
            total,
            label: label.to_string(),
        };
        *self.progress.lock().await = state.clone();
        self.emit(Event::Progress { state });
    }

    /// Count one more terminal unit and publish the new aggregate
    ///
    /// The counter is capped at `total`.
    pub(crate) async fn complete_unit(&self, total: usize) -> ProgressState {
        let state = {
            let mut progress = self.progress.lock().await;
            let done = (progress.done + 1).min(total);
            *progress = ProgressState {
                done,
                total,
                label: if done >= total {
                    LABEL_ALL_DONE.to_string()
                } else {
                    format!("processing {}/{}", done, total)
                },
            };
            progress.clone()
        };
        self.emit(Event::Progress {
            state: state.clone(),
        });
        state
    }

    /// Start a new batch generation, invalidating pending resets of earlier batches
    pub(crate) fn begin_batch(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reset progress to idle after `delay`, unless another batch started meanwhile
    pub(crate) fn schedule_reset(self: &Arc<Self>, generation: u64, delay: Duration) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if hub.generation.load(Ordering::SeqCst) == generation {
                hub.set_progress(0, 0, "").await;
            } else {
                tracing::debug!(generation, "newer batch running, keeping its progress");
            }
        });
    }

    // -----------------------------------------------------------------------
    // Local downloads
    // -----------------------------------------------------------------------

    /// Allocate an id for a new local download
    pub fn next_download_id(&self) -> DownloadId {
        DownloadId(self.next_download_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Record a progress update of a local download
    ///
    /// Finished downloads stay visible for the linger period, then disappear.
    pub async fn record_download(self: &Arc<Self>, update: DownloadProgressUpdate) {
        self.active
            .lock()
            .await
            .insert(update.id, ActiveDownload::from(&update));

        if update.phase == DownloadPhase::Done {
            let hub = Arc::clone(self);
            let id = update.id;
            let linger = self.finished_linger;
            tokio::spawn(async move {
                tokio::time::sleep(linger).await;
                hub.active.lock().await.remove(&id);
            });
        }

        self.emit(Event::DownloadProgress { update });
    }

    /// Forget a local download immediately (failed or cancelled)
    pub async fn drop_download(&self, id: DownloadId) {
        self.active.lock().await.remove(&id);
    }

    /// Snapshot of in-flight and recently finished local downloads, ordered by id
    pub async fn active_downloads(&self) -> Vec<(DownloadId, ActiveDownload)> {
        let mut downloads: Vec<_> = self
            .active
            .lock()
            .await
            .iter()
            .map(|(id, d)| (*id, d.clone()))
            .collect();
        downloads.sort_by_key(|(id, _)| *id);
        downloads
    }
}
