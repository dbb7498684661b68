//! Recursive share tree enumeration over a paginated listing API
//!
//! The walk is depth-first: one page of siblings is read, then every folder
//! on that page is fully resolved (all of its pages and sub-folders) before
//! the walk moves to the next sibling or the next page of the parent. An
//! explicit stack of folder frames replaces call recursion, so deep shares
//! cannot exhaust the task's stack.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{PageFetcher, RawFileItem, ShareSession};
use crate::error::Result;
use crate::types::{NodeKind, ShareFileNode, TransferUnit};

/// What the walk saw on one listing page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    /// Entries on the page
    pub items: usize,
    /// Files on the page
    pub files: usize,
    /// Folders on the page
    pub dirs: usize,
    /// Depth of the entries on the page (0 = starting folder)
    pub depth: u32,
    /// 1-based page number within the folder
    pub page: u32,
}

/// Running totals over the pages of one walk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Entries seen so far
    pub scanned_items: usize,
    /// Files seen so far
    pub files: usize,
    /// Folders seen so far
    pub dirs: usize,
    /// Pages fetched so far
    pub pages: usize,
}

impl ScanStats {
    /// Add one page to the totals
    pub fn record(&mut self, report: &PageReport) {
        self.scanned_items += report.items;
        self.files += report.files;
        self.dirs += report.dirs;
        self.pages += 1;
    }

    /// Status line shown while scanning
    pub fn status_line(&self) -> String {
        format!(
            "scanned {} items (files {}, dirs {})",
            self.scanned_items, self.files, self.dirs
        )
    }
}

impl std::fmt::Display for ScanStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.status_line())
    }
}

/// A fully enumerated share
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTree {
    /// Entries of the starting folder, each with its resolved subtree
    pub roots: Vec<ShareFileNode>,
    /// Totals of the walk that produced the tree
    pub stats: ScanStats,
}

impl ShareTree {
    /// All files of the tree in depth-first order
    pub fn files(&self) -> Vec<&ShareFileNode> {
        let mut files = Vec::new();
        let mut stack: Vec<std::slice::Iter<'_, ShareFileNode>> = vec![self.roots.iter()];
        while let Some(iter) = stack.last_mut() {
            match iter.next() {
                Some(node) => match &node.kind {
                    NodeKind::File { .. } => files.push(node),
                    NodeKind::Directory { children } => stack.push(children.iter()),
                },
                None => {
                    stack.pop();
                }
            }
        }
        files
    }

    /// Find a node anywhere in the tree
    pub fn find(&self, fid: &str) -> Option<&ShareFileNode> {
        let mut stack: Vec<&ShareFileNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.fid == fid {
                return Some(node);
            }
            stack.extend(node.children().iter().rev());
        }
        None
    }

    /// Transfer units for the selected file ids, in tree order
    ///
    /// Ids of folders or of unknown entries are ignored.
    pub fn transfer_units(&self, selection: &HashSet<String>) -> Vec<TransferUnit> {
        self.files()
            .into_iter()
            .filter(|node| selection.contains(&node.fid))
            .filter_map(TransferUnit::from_node)
            .collect()
    }

    /// Combined size of the selected files
    pub fn total_size(&self, selection: &HashSet<String>) -> u64 {
        self.files()
            .into_iter()
            .filter(|node| selection.contains(&node.fid))
            .map(ShareFileNode::size)
            .sum()
    }
}

/// A folder whose listing is still being consumed
struct Frame {
    folder_id: String,
    /// The folder's own entry; `None` for the starting folder
    entry: Option<RawFileItem>,
    /// Depth and path of the folder's own node
    depth: u32,
    path: String,
    /// Depth of the folder's children
    child_depth: u32,
    next_page: u32,
    fetched: usize,
    exhausted: bool,
    pending: VecDeque<RawFileItem>,
    nodes: Vec<ShareFileNode>,
}

impl Frame {
    fn start(folder_id: &str) -> Self {
        Self {
            folder_id: folder_id.to_string(),
            entry: None,
            depth: 0,
            path: String::new(),
            child_depth: 0,
            next_page: 1,
            fetched: 0,
            exhausted: false,
            pending: VecDeque::new(),
            nodes: Vec::new(),
        }
    }

    fn folder(entry: RawFileItem, depth: u32, path: String) -> Self {
        Self {
            folder_id: entry.fid.clone(),
            entry: Some(entry),
            depth,
            path,
            child_depth: depth + 1,
            next_page: 1,
            fetched: 0,
            exhausted: false,
            pending: VecDeque::new(),
            nodes: Vec::new(),
        }
    }

    fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}

fn build_node(item: RawFileItem, depth: u32, path: String, kind: NodeKind) -> ShareFileNode {
    let updated_at = item.modified_at();
    ShareFileNode {
        fid: item.fid,
        name: item.file_name,
        depth,
        path,
        share_fid_token: item.share_fid_token.unwrap_or_default(),
        updated_at,
        format_type: item.format_type.unwrap_or_default(),
        expanded: depth == 0,
        kind,
    }
}

/// Walks a share through a [`PageFetcher`]
pub struct TreeEnumerator {
    fetcher: Arc<dyn PageFetcher>,
    page_size: usize,
}

impl TreeEnumerator {
    /// Create an enumerator requesting `page_size` entries per page
    pub fn new(fetcher: Arc<dyn PageFetcher>, page_size: usize) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
        }
    }

    /// Enumerate everything below `root_folder_id`
    pub async fn enumerate(&self, share: &ShareSession, root_folder_id: &str) -> Result<ShareTree> {
        self.enumerate_with(share, root_folder_id, |_| {}).await
    }

    /// Enumerate everything below `root_folder_id`, reporting each page to `observer`
    ///
    /// The observer is called synchronously in fetch order. Any failed page
    /// aborts the walk; no partial tree is returned.
    pub async fn enumerate_with<F>(
        &self,
        share: &ShareSession,
        root_folder_id: &str,
        mut observer: F,
    ) -> Result<ShareTree>
    where
        F: FnMut(&PageReport) + Send,
    {
        let mut stats = ScanStats::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack = vec![Frame::start(root_folder_id)];

        loop {
            let Some(top) = stack.last_mut() else {
                // The starting frame is only popped on return
                return Ok(ShareTree::default());
            };

            if let Some(item) = top.pending.pop_front() {
                if !seen.insert(item.fid.clone()) {
                    tracing::warn!(
                        fid = %item.fid,
                        name = %item.file_name,
                        "entry listed twice, skipping"
                    );
                    continue;
                }
                let depth = top.child_depth;
                let path = top.child_path(&item.file_name);
                if item.is_directory() {
                    stack.push(Frame::folder(item, depth, path));
                } else {
                    let size = item.size.unwrap_or(0);
                    top.nodes
                        .push(build_node(item, depth, path, NodeKind::File { size }));
                }
                continue;
            }

            if !top.exhausted {
                let page = top.next_page;
                let listing = self
                    .fetcher
                    .list_shared_folder(share, &top.folder_id, page, self.page_size)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            folder = %top.folder_id,
                            page,
                            error = %e,
                            "listing page failed, aborting scan"
                        );
                    })?;

                let count = listing.entries.len();
                let dirs = listing.entries.iter().filter(|e| e.is_directory()).count();
                top.fetched += count;
                top.next_page += 1;
                top.exhausted = count == 0
                    || count < self.page_size
                    || listing.total.is_some_and(|total| top.fetched >= total);
                top.pending.extend(listing.entries);

                let report = PageReport {
                    items: count,
                    files: count - dirs,
                    dirs,
                    depth: top.child_depth,
                    page,
                };
                stats.record(&report);
                tracing::debug!(
                    folder = %top.folder_id,
                    page,
                    depth = top.child_depth,
                    entries = count,
                    total = ?listing.total,
                    "listed share page"
                );
                observer(&report);
                continue;
            }

            let Some(done) = stack.pop() else {
                continue;
            };
            match (done.entry, stack.last_mut()) {
                (Some(entry), Some(parent)) => {
                    let children = done.nodes;
                    parent.nodes.push(build_node(
                        entry,
                        done.depth,
                        done.path,
                        NodeKind::Directory { children },
                    ));
                }
                _ => {
                    tracing::info!(
                        items = stats.scanned_items,
                        files = stats.files,
                        dirs = stats.dirs,
                        pages = stats.pages,
                        "share scan finished"
                    );
                    return Ok(ShareTree {
                        roots: done.nodes,
                        stats,
                    });
                }
            }
        }
    }
}
