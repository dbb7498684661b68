//! Share parsing: link, session token, full tree.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::api::ShareSession;
use crate::enumerator::{ScanStats, ShareTree, TreeEnumerator};
use crate::error::Result;
use crate::share_link::{ShareLink, parse_share_url};
use crate::types::{Event, LogLevel};

use super::ShareDownloader;

/// Minimum gap between two scan notifications, except for first pages
const SCAN_NOTIFY_INTERVAL: Duration = Duration::from_secs(1);

/// Characters of the pasted link echoed into the log
const LINK_ECHO_CHARS: usize = 50;

/// A share that was opened and fully enumerated
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParsedShare {
    /// What the pasted link pointed at
    pub link: ShareLink,
    /// Share id and the session token (`stoken`) for later transfers
    pub share: ShareSession,
    /// Enumerated tree, starting at the link's folder
    pub tree: ShareTree,
}

impl ParsedShare {
    /// Session token of the opened share
    pub fn stoken(&self) -> &str {
        &self.share.stoken
    }
}

impl ShareDownloader {
    /// Parse a pasted share link, open the share and enumerate its tree
    ///
    /// Scan progress is published as [`Event::ScanProgress`] for every page
    /// and as throttled notifications. Any failure aborts the parse; it is
    /// logged, announced and returned.
    pub async fn parse_share(&self, input: &str) -> Result<ParsedShare> {
        self.require_session().await?;
        let echo: String = input.trim().chars().take(LINK_ECHO_CHARS).collect();
        self.hub
            .log(LogLevel::Info, format!("parsing: {}...", echo))
            .await;

        match self.parse_inner(input).await {
            Ok(parsed) => {
                let count = parsed.tree.files().len();
                tracing::info!(
                    pwd_id = %parsed.link.pwd_id,
                    files = count,
                    pages = parsed.tree.stats.pages,
                    "share parsed"
                );
                self.hub
                    .announce(
                        LogLevel::Success,
                        format!("parse succeeded, found {} files", count),
                    )
                    .await;
                Ok(parsed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "share parse failed");
                self.hub
                    .announce(LogLevel::Error, format!("parse failed: {}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn parse_inner(&self, input: &str) -> Result<ParsedShare> {
        let link = parse_share_url(input)?;

        self.hub.notify(LogLevel::Info, "fetching access token...");
        let share = self
            .services
            .opener
            .open_share(&link.pwd_id, &link.passcode)
            .await?;

        self.hub.notify(LogLevel::Info, "reading folder structure...");
        let enumerator = TreeEnumerator::new(
            std::sync::Arc::clone(&self.services.fetcher),
            self.config.scan.page_size,
        );

        let hub = &self.hub;
        let mut stats = ScanStats::default();
        let mut last_notified: Option<Instant> = None;
        let tree = enumerator
            .enumerate_with(&share, &link.start_folder_id, |report| {
                stats.record(report);
                hub.emit(Event::ScanProgress {
                    scanned_items: stats.scanned_items,
                    files: stats.files,
                    dirs: stats.dirs,
                    depth: report.depth,
                    page: report.page,
                });

                let due = last_notified.is_none_or(|at| at.elapsed() > SCAN_NOTIFY_INTERVAL);
                if due || report.depth == 0 || report.page == 1 {
                    hub.notify(LogLevel::Info, stats.status_line());
                    last_notified = Some(Instant::now());
                }
            })
            .await?;

        Ok(ParsedShare { link, share, tree })
    }
}
