//! Cloud drive API
//!
//! The transfer core only talks to the remote service through the traits in
//! this module. [`QuarkClient`] is the production implementation on top of
//! reqwest; tests substitute in-memory fakes.

mod client;
mod models;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use client::QuarkClient;
pub use models::{
    CapacityData, DownloadUrlData, QuarkResponse, RawFileItem, ResponseMetadata, SaveAs, SaveData,
    ShareDetailData, ShareTokenData, TASK_STATUS_FINISHED, TaskData,
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An opened share: its id plus the session token obtained with the passcode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSession {
    /// Share identifier (`pwd_id`)
    pub pwd_id: String,
    /// Session token (`stoken`)
    pub stoken: String,
}

/// One page of a shared folder listing
#[derive(Clone, Debug, Default)]
pub struct SharePage {
    /// Entries in server order
    pub entries: Vec<RawFileItem>,
    /// Total entries in the folder, when the server reports it
    pub total: Option<usize>,
}

/// Result of one save task status poll
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveTaskStatus {
    /// The task finished
    pub ready: bool,
    /// Id of the saved copy, present once the task finished
    pub saved_file_id: Option<String>,
}

/// Opens a share with its passcode
#[async_trait::async_trait]
pub trait ShareOpener: Send + Sync {
    /// Exchange `pwd_id` and `passcode` for a [`ShareSession`]
    async fn open_share(&self, pwd_id: &str, passcode: &str) -> Result<ShareSession>;
}

/// Reads shared folder listings page by page
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch page `page` (1-based) of `folder_id` with `page_size` entries
    ///
    /// Anything but a successful response with data is an
    /// [`Error::Remote`](crate::Error::Remote) carrying the server message.
    async fn list_shared_folder(
        &self,
        share: &ShareSession,
        folder_id: &str,
        page: u32,
        page_size: usize,
    ) -> Result<SharePage>;
}

/// Remote operations of the save, poll, resolve and delete workflow
#[async_trait::async_trait]
pub trait TransferService: Send + Sync {
    /// Copy a shared file into the user's own storage, returning the task id to poll
    async fn save_to_own_storage(
        &self,
        share: &ShareSession,
        fid: &str,
        fid_token: &str,
    ) -> Result<String>;

    /// Query a save task; `attempt` is the 0-based poll index
    async fn poll_save_task(&self, task_id: &str, attempt: u32) -> Result<SaveTaskStatus>;

    /// Get a direct download URL for a file in the user's own storage
    async fn resolve_download_url(&self, saved_file_id: &str) -> Result<String>;

    /// Delete a file from the user's own storage
    async fn delete_remote_file(&self, saved_file_id: &str) -> Result<()>;
}
