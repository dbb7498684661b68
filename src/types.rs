//! Core types for quark-share-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of one local download, unique within the process
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DownloadId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// What a share entry is, decided once when the listing is ingested
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    /// A regular file
    File {
        /// Size in bytes
        size: u64,
    },
    /// A folder with its fully resolved children, in listing order
    Directory {
        /// Child nodes
        children: Vec<ShareFileNode>,
    },
}

/// One entry of an enumerated share tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareFileNode {
    /// Remote identifier, unique within one enumeration pass
    pub fid: String,
    /// Display name
    pub name: String,
    /// Nesting level (0 = entries of the starting folder)
    pub depth: u32,
    /// Slash-joined ancestry including the node's own name
    pub path: String,
    /// Capability token required to save this entry
    pub share_fid_token: String,
    /// Last modification time as reported by the server (0 = unknown)
    pub updated_at: i64,
    /// Server-side format hint (e.g. "video/mp4"), may be empty
    pub format_type: String,
    /// UI-only expansion flag, irrelevant to the transfer core
    pub expanded: bool,
    /// File or directory payload
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl ShareFileNode {
    /// Returns true for directories
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// File size in bytes (0 for directories)
    pub fn size(&self) -> u64 {
        match self.kind {
            NodeKind::File { size } => size,
            NodeKind::Directory { .. } => 0,
        }
    }

    /// Children of a directory (empty for files)
    pub fn children(&self) -> &[ShareFileNode] {
        match &self.kind {
            NodeKind::File { .. } => &[],
            NodeKind::Directory { children } => children,
        }
    }
}

/// Work item submitted to the batch orchestrator, one per selected file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUnit {
    /// Remote file identifier inside the share
    pub fid: String,
    /// Capability token authorizing the save of this file
    pub share_fid_token: String,
    /// Name used for the local file
    pub file_name: String,
    /// Size in bytes
    pub size: u64,
}

impl TransferUnit {
    /// Build a unit from a file node; directories are not transferable
    pub fn from_node(node: &ShareFileNode) -> Option<Self> {
        match node.kind {
            NodeKind::File { size } => Some(Self {
                fid: node.fid.clone(),
                share_fid_token: node.share_fid_token.clone(),
                file_name: node.name.clone(),
                size,
            }),
            NodeKind::Directory { .. } => None,
        }
    }
}

/// Terminal result of one transfer unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// Saved, resolved, cleaned up and downloaded
    Completed {
        /// Where the file landed locally
        local_path: PathBuf,
        /// Number of bytes written
        bytes: u64,
    },
    /// The save task never became ready within the poll ceiling
    SkippedTimeout,
    /// Some step failed
    Failed {
        /// Human-readable failure reason
        reason: String,
    },
}

impl TransferOutcome {
    /// Returns true for [`TransferOutcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}

/// Aggregate progress of the current batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Units that reached a terminal state
    pub done: usize,
    /// Units in the batch
    pub total: usize,
    /// Short status text
    pub label: String,
}

impl ProgressState {
    /// Returns true when no batch progress is being shown
    pub fn is_idle(&self) -> bool {
        self.done == 0 && self.total == 0
    }
}

/// Phase of a local download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPhase {
    /// Bytes are being received
    Downloading,
    /// Segments are being joined into the final file
    Merging,
    /// The file is complete
    Done,
}

/// Progress report published by a download engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgressUpdate {
    /// Download the update belongs to
    pub id: DownloadId,
    /// Local file name
    pub filename: String,
    /// Bytes received so far
    pub bytes_downloaded: u64,
    /// Expected size (0 = unknown)
    pub bytes_total: u64,
    /// Current speed in bytes per second
    pub speed: f64,
    /// Current phase
    pub phase: DownloadPhase,
}

/// State of one in-flight local download as shown to the user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveDownload {
    /// Local file name
    pub filename: String,
    /// Bytes received so far
    pub bytes_downloaded: u64,
    /// Expected size (0 = unknown)
    pub bytes_total: u64,
    /// Current speed in bytes per second
    pub speed: f64,
    /// Current phase
    pub phase: DownloadPhase,
}

impl From<&DownloadProgressUpdate> for ActiveDownload {
    fn from(update: &DownloadProgressUpdate) -> Self {
        Self {
            filename: update.filename.clone(),
            bytes_downloaded: update.bytes_downloaded,
            bytes_total: update.bytes_total,
            speed: if update.phase == DownloadPhase::Done {
                0.0
            } else {
                update.speed
            },
            phase: update.phase,
        }
    }
}

/// A file written by the download engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    /// Final path on disk
    pub path: PathBuf,
    /// Size in bytes
    pub bytes: u64,
}

/// Severity of a user-facing log line or notification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    #[default]
    Info,
    /// Something finished well
    Success,
    /// Recoverable problem
    Warn,
    /// Failure
    Error,
}

/// One line of the user-facing batch log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was recorded
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Text
    pub message: String,
}

/// Result of one batch run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Every submitted unit with its outcome, in submission order
    pub outcomes: Vec<(TransferUnit, TransferOutcome)>,
}

impl BatchReport {
    /// Number of units that completed
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Completed { .. }))
    }

    /// Number of units skipped because the save never became ready
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::SkippedTimeout))
    }

    /// Number of units that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Event emitted while scanning a share or running a batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A line was added to the batch log
    Log {
        /// The new line
        entry: LogEntry,
    },

    /// Short-lived notification for the user
    Notification {
        /// Severity
        level: LogLevel,
        /// Text
        message: String,
    },

    /// Aggregate batch progress changed
    Progress {
        /// New aggregate state
        state: ProgressState,
    },

    /// A listing page was read while scanning a share
    ScanProgress {
        /// Entries seen so far
        scanned_items: usize,
        /// Files seen so far
        files: usize,
        /// Folders seen so far
        dirs: usize,
        /// Depth of the folder the page belongs to
        depth: u32,
        /// 1-based page number inside that folder
        page: u32,
    },

    /// A local download reported progress
    DownloadProgress {
        /// The update
        update: DownloadProgressUpdate,
    },

    /// A batch started
    BatchStarted {
        /// Units in the batch
        total: usize,
        /// Workers started
        concurrency: usize,
    },

    /// One unit reached a terminal state
    TransferFinished {
        /// 0-based position of the unit in the batch
        index: usize,
        /// Remote file id
        fid: String,
        /// File name
        file_name: String,
        /// What happened
        outcome: TransferOutcome,
    },

    /// A batch finished
    BatchFinished {
        /// Units in the batch
        total: usize,
        /// Units that completed
        completed: usize,
        /// Units skipped on poll timeout
        skipped: usize,
        /// Units that failed
        failed: usize,
    },
}
