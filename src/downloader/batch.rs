//! Batch transfer of a selection from a parsed share.

use std::collections::HashSet;

use crate::error::Result;
use crate::types::{BatchReport, LogLevel};
use crate::utils::format_size;

use super::{ParsedShare, ShareDownloader};

impl ShareDownloader {
    /// Transfer the selected files of `parsed` to the download directory
    ///
    /// `selection` holds file ids; folder ids and unknown ids are ignored.
    /// Returns once every selected file reached a terminal outcome. Per-file
    /// failures are part of the report, not errors.
    ///
    /// # Errors
    /// - [`Error::Config`](crate::Error::Config) if no session cookie is configured
    /// - [`Error::BatchInProgress`](crate::Error::BatchInProgress) if a batch is already running
    pub async fn start_batch(
        &self,
        parsed: &ParsedShare,
        selection: &HashSet<String>,
    ) -> Result<BatchReport> {
        self.require_session().await?;

        let units = parsed.tree.transfer_units(selection);
        let bytes = parsed.tree.total_size(selection);
        tracing::info!(
            pwd_id = %parsed.share.pwd_id,
            selected = selection.len(),
            units = units.len(),
            bytes,
            "batch requested"
        );
        if !units.is_empty() {
            self.hub.notify(
                LogLevel::Info,
                format!(
                    "transferring {} files ({})",
                    units.len(),
                    format_size(bytes)
                ),
            );
        }

        self.orchestrator
            .run(&parsed.share, units)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "batch could not start");
                self.hub
                    .notify(LogLevel::Error, format!("batch failed: {}", e));
            })
    }
}
