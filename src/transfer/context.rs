//! Transfer context: the collaborators and settings every transfer task shares.

use std::sync::Arc;

use crate::api::{ShareSession, TransferService};
use crate::config::TransferConfig;
use crate::download_engine::DownloadEngine;

use super::progress::ProgressHub;

/// Everything a single file transfer needs, shared by all workers of one batch
pub(crate) struct TransferContext {
    /// Share the units belong to
    pub(crate) share: ShareSession,
    /// Remote save/poll/resolve/delete operations
    pub(crate) service: Arc<dyn TransferService>,
    /// Local downloader for resolved URLs
    pub(crate) engine: Arc<dyn DownloadEngine>,
    /// Progress, logs and events
    pub(crate) hub: Arc<ProgressHub>,
    /// Polling and pacing settings
    pub(crate) settings: TransferConfig,
    /// Range requests per local download
    pub(crate) parallelism: usize,
}
