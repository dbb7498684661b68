//! Configuration types for quark-share-dl

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Cloud API endpoints and session settings
///
/// Hosts are configurable so that tests (or a local proxy) can stand in for
/// the real service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the share-page host (default: "https://pan.quark.cn")
    #[serde(default = "default_pan_base_url")]
    pub pan_base_url: String,

    /// Base URL of the save/task host (default: "https://drive-pc.quark.cn")
    #[serde(default = "default_drive_pc_base_url")]
    pub drive_pc_base_url: String,

    /// Base URL of the file download/delete host (default: "https://drive.quark.cn")
    #[serde(default = "default_drive_base_url")]
    pub drive_base_url: String,

    /// Session cookie header of the logged-in account (empty = anonymous)
    #[serde(default)]
    pub cookie: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "millis_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            pan_base_url: default_pan_base_url(),
            drive_pc_base_url: default_drive_pc_base_url(),
            drive_base_url: default_drive_base_url(),
            cookie: String::new(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Share tree scanning settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Number of entries requested per listing page (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Batch transfer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Number of files processed concurrently (default: 5)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay before each save-task status poll (default: 500 ms)
    #[serde(default = "default_poll_interval", with = "millis_serde")]
    pub poll_interval: Duration,

    /// Number of status polls before a save is given up (default: 20)
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Pause a worker takes between two files (default: 300 ms)
    #[serde(default = "default_pacing_delay", with = "millis_serde")]
    pub pacing_delay: Duration,

    /// How long the final `(total, total)` progress stays visible before reset (default: 3 s)
    #[serde(default = "default_settle_delay", with = "millis_serde")]
    pub settle_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            pacing_delay: default_pacing_delay(),
            settle_delay: default_settle_delay(),
        }
    }
}

/// Local download settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Parallel range requests per file (default: 8, clamped to 1..=999)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Files smaller than this are always fetched with a single stream (default: 10 MiB)
    #[serde(default = "default_min_segmented_size")]
    pub min_segmented_size: u64,

    /// Minimum interval between two progress updates of one download (default: 500 ms)
    #[serde(default = "default_progress_interval", with = "millis_serde")]
    pub progress_interval: Duration,

    /// How long a finished download stays in the active list (default: 2 s)
    #[serde(default = "default_finished_linger", with = "millis_serde")]
    pub finished_linger: Duration,

    /// Maximum number of redirects followed before the CDN URL (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            threads: default_threads(),
            min_segmented_size: default_min_segmented_size(),
            progress_interval: default_progress_interval(),
            finished_linger: default_finished_linger(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Main configuration for [`ShareDownloader`](crate::ShareDownloader)
///
/// Fields are organized into sub-configs:
/// - [`api`](ApiConfig) - endpoints, cookie, timeouts
/// - [`scan`](ScanConfig) - share tree listing
/// - [`transfer`](TransferConfig) - batch concurrency and polling
/// - [`download`](DownloadConfig) - local download engine
///
/// All sub-config fields are flattened, so the JSON format has no nesting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cloud API settings
    #[serde(flatten)]
    pub api: ApiConfig,

    /// Share tree scanning
    #[serde(flatten)]
    pub scan: ScanConfig,

    /// Batch transfer behavior
    #[serde(flatten)]
    pub transfer: TransferConfig,

    /// Local download behavior
    #[serde(flatten)]
    pub download: DownloadConfig,
}

impl Config {
    /// Parse a configuration from JSON text, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&text)
    }

    /// Check the settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.scan.page_size == 0 {
            return Err(Error::config("page_size", "page size must be at least 1"));
        }
        if self.transfer.concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self.transfer.max_poll_attempts == 0 {
            return Err(Error::config(
                "max_poll_attempts",
                "at least one poll attempt is required",
            ));
        }
        if self.download.threads == 0 {
            return Err(Error::config("threads", "threads must be at least 1"));
        }
        Ok(())
    }

    /// Download thread count clamped to the supported range
    pub fn download_threads(&self) -> usize {
        self.download.threads.clamp(1, MAX_DOWNLOAD_THREADS)
    }
}

/// Upper bound on parallel range requests for one file
pub const MAX_DOWNLOAD_THREADS: usize = 999;

fn default_pan_base_url() -> String {
    "https://pan.quark.cn".to_string()
}

fn default_drive_pc_base_url() -> String {
    "https://drive-pc.quark.cn".to_string()
}

fn default_drive_base_url() -> String {
    "https://drive.quark.cn".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     quark-cloud-drive/2.5.20 Chrome/100.0.4896.160 Electron/18.3.5.4-b478491100 \
     Safari/537.36 Channel/pckk_other_ch"
        .to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    5
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_poll_attempts() -> u32 {
    20
}

fn default_pacing_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_threads() -> usize {
    8
}

fn default_min_segmented_size() -> u64 {
    10 * 1024 * 1024
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_finished_linger() -> Duration {
    Duration::from_secs(2)
}

fn default_max_redirects() -> u32 {
    5
}

// Durations are written as whole milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
