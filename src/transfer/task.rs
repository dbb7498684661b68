//! Per-file transfer: save, poll, resolve, clean up, download.
//!
//! Once the save task yields a saved-copy id, the copy is deleted exactly
//! once, whether resolving the download link succeeds or not. The resolved
//! URL carries its own signature and stays valid after the delete, so the
//! local download runs after the cleanup.

use crate::error::{Error, TransferError};
use crate::types::{LogLevel, TransferOutcome, TransferUnit};
use crate::utils::format_size;

use super::context::TransferContext;

/// Step a transfer is in, for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransferPhase {
    Saving,
    Polling,
    Resolving,
    Cleaning,
    Downloading,
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferPhase::Saving => "saving",
            TransferPhase::Polling => "polling",
            TransferPhase::Resolving => "resolving",
            TransferPhase::Cleaning => "cleaning",
            TransferPhase::Downloading => "downloading",
        };
        f.write_str(name)
    }
}

/// How polling a save task ended
enum PollResult {
    Saved(String),
    /// Finished but the server named no saved copy
    NoFileId,
    TimedOut,
}

/// Run one unit through the whole workflow
///
/// Never fails: every error is folded into the returned outcome.
pub(crate) async fn run_transfer_task(
    ctx: &TransferContext,
    index: usize,
    total: usize,
    unit: &TransferUnit,
) -> TransferOutcome {
    let hub = &ctx.hub;
    hub.log(
        LogLevel::Info,
        format!("[{}/{}] processing: {}", index + 1, total, unit.file_name),
    )
    .await;

    // Saving
    hub.log(LogLevel::Info, "  saving to drive...").await;
    let task_id = match ctx
        .service
        .save_to_own_storage(&ctx.share, &unit.fid, &unit.share_fid_token)
        .await
    {
        Ok(task_id) => task_id,
        Err(e) => {
            let err = TransferError::SaveFailed {
                reason: e.to_string(),
            };
            return fail(ctx, unit, TransferPhase::Saving, err).await;
        }
    };

    // Polling
    let saved_id = match poll_until_ready(ctx, &task_id).await {
        PollResult::Saved(id) => id,
        PollResult::NoFileId => {
            tracing::warn!(fid = %unit.fid, task_id = %task_id, "save finished without a saved file id");
            hub.log(LogLevel::Warn, "  save returned no file id, skipping")
                .await;
            hub.notify(
                LogLevel::Warn,
                format!("{}: save returned no file id, skipped", unit.file_name),
            );
            return TransferOutcome::SkippedTimeout;
        }
        PollResult::TimedOut => {
            let err = Error::Timeout {
                attempts: ctx.settings.max_poll_attempts,
            };
            // The task may still finish server-side and leave a copy behind
            tracing::warn!(
                fid = %unit.fid,
                task_id = %task_id,
                error = %err,
                "save task timed out, a saved copy may remain in the drive"
            );
            hub.log(LogLevel::Warn, "  save timed out, skipping").await;
            hub.notify(
                LogLevel::Warn,
                format!("{}: save timed out, skipped", unit.file_name),
            );
            return TransferOutcome::SkippedTimeout;
        }
    };

    // Resolving, then Cleaning regardless of the result
    hub.log(LogLevel::Info, "  resolving download link...").await;
    let resolved = ctx.service.resolve_download_url(&saved_id).await;
    release_saved_copy(ctx, &saved_id).await;

    let url = match resolved {
        Ok(url) => url,
        Err(e) => {
            let err = TransferError::ResolveFailed {
                reason: e.to_string(),
            };
            return fail(ctx, unit, TransferPhase::Resolving, err).await;
        }
    };

    // Downloading
    hub.log(LogLevel::Info, "  downloading...").await;
    match ctx
        .engine
        .download_to_local(&url, &unit.file_name, ctx.parallelism)
        .await
    {
        Ok(local) => {
            tracing::info!(
                fid = %unit.fid,
                path = %local.path.display(),
                bytes = local.bytes,
                "file transferred"
            );
            hub.log(
                LogLevel::Success,
                format!(
                    "  saved to {} ({})",
                    local.path.display(),
                    format_size(local.bytes)
                ),
            )
            .await;
            TransferOutcome::Completed {
                local_path: local.path,
                bytes: local.bytes,
            }
        }
        Err(e) => {
            let err = TransferError::DownloadFailed {
                reason: e.to_string(),
            };
            fail(ctx, unit, TransferPhase::Downloading, err).await
        }
    }
}

/// Poll the save task, sleeping before every attempt
///
/// A failed poll request counts as a not-ready attempt.
async fn poll_until_ready(ctx: &TransferContext, task_id: &str) -> PollResult {
    let settings = &ctx.settings;
    for attempt in 0..settings.max_poll_attempts {
        tokio::time::sleep(settings.poll_interval).await;
        match ctx.service.poll_save_task(task_id, attempt).await {
            Ok(status) if status.ready => {
                return match status.saved_file_id {
                    Some(id) => PollResult::Saved(id),
                    None => PollResult::NoFileId,
                };
            }
            Ok(_) => {
                tracing::debug!(task_id, attempt, "save task not ready yet");
            }
            Err(e) => {
                tracing::debug!(task_id, attempt, error = %e, "save task poll failed");
            }
        }
    }
    PollResult::TimedOut
}

/// Delete the saved copy; failures are only warnings
async fn release_saved_copy(ctx: &TransferContext, saved_id: &str) {
    match ctx.service.delete_remote_file(saved_id).await {
        Ok(()) => {
            ctx.hub.log(LogLevel::Info, "  cleanup done").await;
        }
        Err(e) => {
            tracing::warn!(
                saved_id,
                phase = %TransferPhase::Cleaning,
                error = %e,
                "failed to delete saved copy"
            );
            ctx.hub
                .log(LogLevel::Warn, format!("  cleanup failed: {}", e))
                .await;
            ctx.hub
                .notify(LogLevel::Warn, format!("cleanup failed: {}", e));
        }
    }
}

async fn fail(
    ctx: &TransferContext,
    unit: &TransferUnit,
    phase: TransferPhase,
    err: TransferError,
) -> TransferOutcome {
    tracing::error!(fid = %unit.fid, name = %unit.file_name, %phase, error = %err, "file transfer failed");
    // Indented under the unit's "processing" line; the notification names the file
    ctx.hub.log(LogLevel::Error, format!("  {}", err)).await;
    ctx.hub
        .notify(LogLevel::Error, format!("{}: {}", unit.file_name, err));
    TransferOutcome::Failed {
        reason: err.to_string(),
    }
}
