//! The [`ShareDownloader`] facade, split into focused submodules:
//! - [`parse`] - Share link parsing, opening and tree enumeration
//! - [`batch`] - Starting a batch transfer from a parsed share and a selection

mod batch;
mod parse;


pub use parse::ParsedShare;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::api::{PageFetcher, QuarkClient, ShareOpener, TransferService};
use crate::config::Config;
use crate::download_engine::{DownloadEngine, HttpDownloadEngine};
use crate::error::{Error, Result};
use crate::transfer::{BatchOrchestrator, ProgressHub};
use crate::types::{ActiveDownload, DownloadId, Event, LogEntry, LogLevel, ProgressState};

/// Capacity of the event channel; slower subscribers see `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Remote and local collaborators of the facade
#[derive(Clone)]
pub struct Services {
    /// Exchanges share ids and passcodes for session tokens
    pub opener: Arc<dyn ShareOpener>,
    /// Reads shared folder listings
    pub fetcher: Arc<dyn PageFetcher>,
    /// Save, poll, resolve and delete operations
    pub transfer: Arc<dyn TransferService>,
    /// Local downloader for resolved URLs
    pub engine: Arc<dyn DownloadEngine>,
}

/// Main entry point (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ShareDownloader {
    pub(crate) config: Arc<Config>,
    pub(crate) hub: Arc<ProgressHub>,
    pub(crate) services: Services,
    pub(crate) orchestrator: Arc<BatchOrchestrator>,
}

impl ShareDownloader {
    /// Create a downloader talking to the real cloud drive
    ///
    /// Validates the configuration, creates the download directory and wires
    /// one [`QuarkClient`] and one [`HttpDownloadEngine`] together.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quark_share_dl::{Config, ShareDownloader};
    /// use std::collections::HashSet;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut config = Config::default();
    ///     config.api.cookie = "__puus=...".to_string();
    ///
    ///     let downloader = ShareDownloader::new(config).await?;
    ///     let parsed = downloader
    ///         .parse_share("https://pan.quark.cn/s/abc123?pwd=x7Yz")
    ///         .await?;
    ///
    ///     let everything: HashSet<String> =
    ///         parsed.tree.files().iter().map(|f| f.fid.clone()).collect();
    ///     let report = downloader.start_batch(&parsed, &everything).await?;
    ///     println!("{} completed", report.completed());
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let hub = Arc::new(ProgressHub::new(event_tx, config.download.finished_linger));

        let client = Arc::new(QuarkClient::new(config.api.clone())?);
        let engine = Arc::new(HttpDownloadEngine::new(
            &config.api,
            config.download.clone(),
            Arc::clone(&hub),
        )?);
        let services = Services {
            opener: client.clone(),
            fetcher: client.clone(),
            transfer: client,
            engine,
        };

        tracing::info!(
            download_dir = %config.download.download_dir.display(),
            concurrency = config.transfer.concurrency,
            threads = config.download_threads(),
            "share downloader initialized"
        );
        Self::with_services(config, hub, services)
    }

    /// Create a downloader on top of caller-provided collaborators
    ///
    /// `hub` must be the hub the engine publishes its progress to, if it
    /// publishes any.
    pub fn with_services(config: Config, hub: Arc<ProgressHub>, services: Services) -> Result<Self> {
        config.validate()?;
        let orchestrator = Arc::new(BatchOrchestrator::new(
            Arc::clone(&services.transfer),
            Arc::clone(&services.engine),
            Arc::clone(&hub),
            config.transfer.clone(),
            config.download_threads(),
        ));
        Ok(Self {
            config: Arc::new(config),
            hub,
            services,
            orchestrator,
        })
    }

    /// Subscribe to events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber falling behind by more than the channel capacity receives
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.hub.subscribe()
    }

    /// Events as a stream; lagged gaps are logged and skipped
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event subscriber lagged, events dropped");
                None
            }
        })
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Aggregate progress of the current (or last) batch
    pub async fn progress(&self) -> ProgressState {
        self.hub.progress().await
    }

    /// Log lines of the current (or last) run, newest first
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.hub.logs().await
    }

    /// Local downloads in flight or recently finished
    pub async fn active_downloads(&self) -> Vec<(DownloadId, ActiveDownload)> {
        self.hub.active_downloads().await
    }

    /// Returns true while a batch is running
    pub fn is_batch_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Abort all local downloads in flight
    ///
    /// Units whose download is aborted end as failed; the batch itself keeps
    /// going with the remaining units.
    pub async fn cancel_downloads(&self) {
        self.services.engine.cancel_all().await;
    }

    /// Refuse to talk to the drive without a session cookie
    async fn require_session(&self) -> Result<()> {
        if self.config.api.cookie.trim().is_empty() {
            self.hub
                .announce(LogLevel::Warn, "please log in first")
                .await;
            return Err(Error::config("cookie", "no session cookie configured"));
        }
        Ok(())
    }
}
