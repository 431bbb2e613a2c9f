use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sftpdir_protocol::{FileKind, SftpError};
use tokio::sync::mpsc;

use crate::path::CanonicalPath;

/// Caller-supplied predicate deciding which entries take part in a walk.
///
/// Receives the candidate's full source path and whether it is a
/// directory. Rejecting a directory prunes its whole subtree.
pub type Filter = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

/// Wraps a closure as a [`Filter`].
pub fn filter<F>(f: F) -> Filter
where
    F: Fn(&str, bool) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One entry of a walked source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    /// Path below the walk root, `/`-separated. Empty for the root itself.
    pub relative_path: String,
    pub kind: FileKind,
    pub size: u64,
}

impl TreeEntry {
    /// Number of segments below the walk root (0 for the root).
    pub fn depth(&self) -> usize {
        if self.relative_path.is_empty() {
            0
        } else {
            self.relative_path.split('/').count()
        }
    }
}

/// A unit of work for the scheduler: create one directory or copy one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub source: CanonicalPath,
    pub destination: CanonicalPath,
    pub kind: FileKind,
    /// Depth below the transfer root; the scheduler's wave number.
    pub depth: usize,
}

/// The settled result of one task.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub task: TransferTask,
    /// Bytes copied for files, 0 for directories.
    pub result: Result<u64, SftpError>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Progress notifications sent while a bulk transfer runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A file was copied from the remote to the local side.
    Downloaded { source: String, destination: String },
    /// A file was copied from the local to the remote side.
    Uploaded { source: String, destination: String },
    /// A task failed.
    Failed { source: String, error: String },
}

/// Per-call options for a bulk transfer.
#[derive(Clone, Default)]
pub struct TransferOptions {
    /// Maximum tasks in flight. Falls back to the client configuration.
    pub concurrency_limit: Option<usize>,
    pub filter: Option<Filter>,
    /// Use the bulk read/write primitives for file tasks. Falls back to
    /// the client configuration.
    pub use_accelerated_transfer: Option<bool>,
    pub events: Option<mpsc::Sender<TransferEvent>>,
}

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(filter(f));
        self
    }

    pub fn with_accelerated_transfer(mut self, enabled: bool) -> Self {
        self.use_accelerated_transfer = Some(enabled);
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

impl fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOptions")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("use_accelerated_transfer", &self.use_accelerated_transfer)
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// Totals for a successful bulk transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Everything a successful tree copy produced.
#[derive(Debug, Clone)]
pub struct TreeRun {
    pub source: CanonicalPath,
    pub destination: CanonicalPath,
    /// One outcome per task, in submission order.
    pub outcomes: Vec<TransferOutcome>,
    pub summary: TransferSummary,
}
