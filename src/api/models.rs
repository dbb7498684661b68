//! Wire models of the cloud drive JSON API

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Common response envelope of every endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct QuarkResponse<T> {
    /// HTTP-like status; 200 means success
    #[serde(default)]
    pub status: i64,
    /// Service-specific code (0 on success)
    #[serde(default)]
    pub code: i64,
    /// Server message, shown to the user on failure
    #[serde(default)]
    pub message: String,
    /// Payload, absent on most failures
    pub data: Option<T>,
    /// Paging metadata for listing endpoints
    #[serde(default)]
    pub metadata: Option<ResponseMetadata>,
}

/// Paging metadata of a listing response
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseMetadata {
    /// Total number of entries in the listed folder
    #[serde(rename = "_total", default)]
    pub total: Option<usize>,
}

impl<T> QuarkResponse<T> {
    /// True when the envelope reports success
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Extract the payload of a successful response, or the server's message as an error
    pub fn into_data(self, fallback: &str) -> Result<T> {
        match self.data {
            Some(data) if self.status == 200 => Ok(data),
            _ => Err(Error::remote(Some(&self.message), fallback)),
        }
    }

    /// Check a response whose payload is not needed
    pub fn check(&self, fallback: &str) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::remote(Some(&self.message), fallback))
        }
    }

    /// Server-reported total of the listed folder
    pub fn total(&self) -> Option<usize> {
        self.metadata.as_ref().and_then(|m| m.total)
    }
}

/// Listing entry as returned by the share detail endpoint
///
/// The server is inconsistent about how it marks folders, so every signal is
/// optional and [`RawFileItem::is_directory`] combines them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFileItem {
    /// Remote file id
    pub fid: String,
    /// Display name
    pub file_name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
    /// Explicit folder flag
    #[serde(default)]
    pub dir: Option<bool>,
    /// 0 = folder, 1 = file
    #[serde(default)]
    pub file_type: Option<i64>,
    /// Category string, "dir" for folders
    #[serde(default)]
    pub obj_category: Option<String>,
    /// Format hint such as "video/mp4"
    #[serde(default)]
    pub format_type: Option<String>,
    /// Modification time
    #[serde(default)]
    pub updated_at: Option<i64>,
    /// Alternative modification time used by some responses
    #[serde(default)]
    pub l_updated_at: Option<i64>,
    /// Capability token needed to save the entry
    #[serde(default)]
    pub share_fid_token: Option<String>,
}

impl RawFileItem {
    /// An entry is a folder if any of the three signals says so
    pub fn is_directory(&self) -> bool {
        self.dir == Some(true)
            || self.file_type == Some(0)
            || self.obj_category.as_deref() == Some("dir")
    }

    /// Modification time, falling back to `l_updated_at`
    pub fn modified_at(&self) -> i64 {
        self.updated_at.or(self.l_updated_at).unwrap_or(0)
    }
}

/// Payload of the share detail endpoint
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ShareDetailData {
    /// Entries of the requested page
    #[serde(default)]
    pub list: Vec<RawFileItem>,
}

/// Payload of the share token endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct ShareTokenData {
    /// Session token for subsequent share requests
    pub stoken: String,
}

/// Payload of the save endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct SaveData {
    /// Asynchronous task to poll
    pub task_id: String,
}

/// Payload of the task status endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct TaskData {
    /// 2 = finished
    #[serde(default)]
    pub status: i64,
    /// Where the save landed, present once finished
    #[serde(default)]
    pub save_as: Option<SaveAs>,
}

/// Result section of a finished save task
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SaveAs {
    /// Ids of the saved top-level entries
    #[serde(default)]
    pub save_as_top_fids: Vec<String>,
}

/// Task status value of a finished save
pub const TASK_STATUS_FINISHED: i64 = 2;

impl TaskData {
    /// Returns true when the task finished
    pub fn is_finished(&self) -> bool {
        self.status == TASK_STATUS_FINISHED
    }

    /// First saved id of a finished task
    pub fn saved_file_id(&self) -> Option<String> {
        self.save_as
            .as_ref()
            .and_then(|s| s.save_as_top_fids.first())
            .cloned()
    }
}

/// One entry of the download endpoint payload
#[derive(Clone, Debug, Deserialize)]
pub struct DownloadUrlData {
    /// Signed CDN URL
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Storage quota of the logged-in account, from the member endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityData {
    /// Bytes in use
    #[serde(default)]
    pub use_capacity: u64,
    /// Total quota in bytes
    #[serde(default)]
    pub total_capacity: u64,
}

impl CapacityData {
    /// Bytes still free; zero when the account is over quota
    pub fn remaining(&self) -> u64 {
        self.total_capacity.saturating_sub(self.use_capacity)
    }
}
