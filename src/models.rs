//! Core data models used throughout the curator.
//!
//! These types represent remote items, run state, and the run log that the
//! ingestion pipeline produces and the status boundary reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether a remote item is a regular file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

/// Raw item produced by the enumerator. Ephemeral: re-fetched every run.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Stable remote identifier.
    pub id: String,
    pub name: String,
    /// Lowercased extension including the leading dot, empty when absent.
    pub extension: String,
    pub size: u64,
    pub kind: ItemKind,
    /// Folder graphs are not guaranteed tree-shaped: zero, one, or many parents.
    pub parents: Vec<String>,
    /// True for items whose parent folder could not be resolved during
    /// traversal. Failures for limbo items quarantine more aggressively.
    pub limbo: bool,
}

impl SourceItem {
    /// Derive the lowercased extension (with leading dot) from a file name.
    pub fn extension_of(name: &str) -> String {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                format!(".{}", ext.to_ascii_lowercase())
            }
            _ => String::new(),
        }
    }
}

/// Stage of an in-progress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Scanning,
    Processing,
    CleaningFolders,
}

/// One per-item failure recorded in the run log.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    /// Item name (or id when the name is unknown).
    pub item: String,
    pub reason: String,
}

/// Accumulating log for a single run. Reset at the start of the next run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLog {
    /// Bucket name → ids relocated into it this run.
    pub moved: BTreeMap<String, Vec<String>>,
    pub errors: Vec<ItemError>,
    /// Files seen by the enumerator this run.
    pub scanned: usize,
    /// Admissions rejected by the ledger this run (per-run count, not the
    /// cumulative ledger size).
    pub duplicates_skipped: usize,
}

impl RunLog {
    pub fn record_move(&mut self, bucket: &str, item_id: &str) {
        self.moved
            .entry(bucket.to_string())
            .or_default()
            .push(item_id.to_string());
    }

    pub fn record_error(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(ItemError {
            item: item.into(),
            reason: reason.into(),
        });
    }
}

/// Mutable run state. Exactly one per process; written only by the
/// orchestrator, read by anyone through [`crate::service::Curator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub stage: RunStage,
    pub last_run: Option<DateTime<Utc>>,
    pub log: RunLog,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            running: false,
            stage: RunStage::Idle,
            last_run: None,
            log: RunLog::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(SourceItem::extension_of("Report.PDF"), ".pdf");
        assert_eq!(SourceItem::extension_of("notes.txt"), ".txt");
    }

    #[test]
    fn extension_absent_for_dotless_or_hidden_names() {
        assert_eq!(SourceItem::extension_of("Makefile"), "");
        assert_eq!(SourceItem::extension_of(".gitignore"), "");
        assert_eq!(SourceItem::extension_of("trailing."), "");
    }

    #[test]
    fn run_log_accumulates_moves_per_bucket() {
        let mut log = RunLog::default();
        log.record_move("PDFs", "a");
        log.record_move("PDFs", "b");
        log.record_move("Code", "c");
        assert_eq!(log.moved["PDFs"], vec!["a", "b"]);
        assert_eq!(log.moved["Code"], vec!["c"]);
    }
}
