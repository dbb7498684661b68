//! # quark-share-dl
//!
//! Share-link enumeration and batch transfer library for the Quark cloud drive.
//!
//! ## Design Philosophy
//!
//! quark-share-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Pluggable** - Every remote and local collaborator sits behind a trait
//! - **Tidy** - Copies saved into the user's drive are deleted again as soon
//!   as their download link is known
//!
//! ## Quick Start
//!
//! ```no_run
//! use quark_share_dl::{Config, ShareDownloader};
//! use std::collections::HashSet;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.cookie = std::env::var("QUARK_COOKIE")?;
//!     config.transfer.concurrency = 3;
//!
//!     let downloader = ShareDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let parsed = downloader
//!         .parse_share("https://pan.quark.cn/s/abc123?pwd=x7Yz")
//!         .await?;
//!     let selection: HashSet<String> =
//!         parsed.tree.files().iter().map(|f| f.fid.clone()).collect();
//!     let report = downloader.start_batch(&parsed, &selection).await?;
//!     println!(
//!         "{} completed, {} skipped, {} failed",
//!         report.completed(),
//!         report.skipped(),
//!         report.failed()
//!     );
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Cloud drive API: collaborator traits, wire models, reqwest client
pub mod api;
/// Configuration types
pub mod config;
/// Local download of resolved URLs
pub mod download_engine;
/// The `ShareDownloader` facade
pub mod downloader;
/// Share tree enumeration
pub mod enumerator;
/// Error types
pub mod error;
/// Share link parsing
pub mod share_link;
/// Batch transfer orchestration and progress
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use api::{
    CapacityData, PageFetcher, QuarkClient, SaveTaskStatus, SharePage, ShareOpener, ShareSession,
    TransferService,
};
pub use config::{ApiConfig, Config, DownloadConfig, ScanConfig, TransferConfig};
pub use download_engine::{DownloadEngine, HttpDownloadEngine};
pub use downloader::{ParsedShare, Services, ShareDownloader};
pub use enumerator::{ScanStats, ShareTree, TreeEnumerator};
pub use error::{Error, Result, TransferError};
pub use share_link::{ShareLink, parse_share_url};
pub use transfer::{BatchOrchestrator, ProgressHub};
pub use types::{
    ActiveDownload, BatchReport, DownloadId, DownloadPhase, Event, LocalFile, LogEntry, LogLevel,
    NodeKind, ProgressState, ShareFileNode, TransferOutcome, TransferUnit,
};

/// Wait for a termination signal, then abort the local downloads in flight.
///
/// - **Unix:** listens for SIGTERM and SIGINT.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use quark_share_dl::{Config, ShareDownloader, cancel_on_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ShareDownloader::new(Config::default()).await?;
///     tokio::spawn(cancel_on_shutdown(downloader.clone()));
///     Ok(())
/// }
/// ```
pub async fn cancel_on_shutdown(downloader: ShareDownloader) {
    wait_for_signal().await;
    downloader.cancel_downloads().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
