//! Directory upload and download.
//!
//! Both directions are the same tree copy between two sessions: the
//! source is walked, every directory becomes a mkdir task and every file
//! a copy task against the mirrored destination path, and the scheduler
//! runs them in depth waves.

use sftpdir_protocol::{ErrorKind, FileKind, Result, SftpError};
use sftpdir_session::TransportSession;
use sftpdir_transfer::{CopyRequest, DEFAULT_CHUNK_SIZE, copy_file};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CONCURRENCY_LIMIT;
use crate::mkdir::ensure_directory;
use crate::path::CanonicalPath;
use crate::scheduler::ConcurrencyLimitedScheduler;
use crate::types::{
    TransferEvent, TransferOptions, TransferOutcome, TransferSummary, TransferTask, TreeRun,
};
use crate::walker::DirectoryWalker;

/// Which way a tree copy goes, relative to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    /// Operation name used in error messages.
    pub fn op(self) -> &'static str {
        match self {
            Direction::Download => "downloadDir",
            Direction::Upload => "uploadDir",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Direction::Download => "downloaded",
            Direction::Upload => "uploaded",
        }
    }

    fn event(self, source: &CanonicalPath, destination: &CanonicalPath) -> TransferEvent {
        let (source, destination) = (source.to_string(), destination.to_string());
        match self {
            Direction::Download => TransferEvent::Downloaded {
                source,
                destination,
            },
            Direction::Upload => TransferEvent::Uploaded {
                source,
                destination,
            },
        }
    }
}

fn notify(events: Option<&mpsc::Sender<TransferEvent>>, event: TransferEvent) {
    if let Some(tx) = events {
        if tx.try_send(event).is_err() {
            debug!("transfer event dropped");
        }
    }
}

/// Copies directory trees from one session to another.
pub struct BulkTransferEngine<'a> {
    source: &'a dyn TransportSession,
    destination: &'a dyn TransportSession,
    direction: Direction,
    chunk_size: usize,
}

impl<'a> BulkTransferEngine<'a> {
    pub fn new(
        source: &'a dyn TransportSession,
        destination: &'a dyn TransportSession,
        direction: Direction,
    ) -> Self {
        Self {
            source,
            destination,
            direction,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Copies the tree at `src` to `dst` and returns a confirmation such as
    /// `"/srv/data downloaded to /tmp/data"`.
    pub async fn transfer(
        &self,
        src: &CanonicalPath,
        dst: &CanonicalPath,
        options: &TransferOptions,
    ) -> Result<String> {
        let run = self.run_tree(src, dst, options).await?;
        Ok(format!(
            "{} {} to {}",
            run.source,
            self.direction.verb(),
            run.destination
        ))
    }

    /// Copies the tree at `src` to `dst`, returning every task outcome.
    ///
    /// The source is checked before anything at the destination is
    /// touched. If any task fails the whole call fails with the first
    /// failure in submission order; whatever was already copied stays.
    pub async fn run_tree(
        &self,
        src: &CanonicalPath,
        dst: &CanonicalPath,
        options: &TransferOptions,
    ) -> Result<TreeRun> {
        let op = self.direction.op();
        let limit = options
            .concurrency_limit
            .unwrap_or(DEFAULT_CONCURRENCY_LIMIT);
        let accelerated = options.use_accelerated_transfer.unwrap_or(false);

        let stat = self
            .source
            .stat(src.as_str())
            .await
            .map_err(|e| e.with_op(op))?;
        if !stat.kind.is_dir() {
            return Err(SftpError::new(ErrorKind::NotADirectory, op, src.as_str()));
        }
        self.validate_destination(dst).await?;

        let entries = DirectoryWalker::new(self.source)
            .with_filter(options.filter.as_ref())
            .walk(src)
            .await
            .map_err(|e| e.with_op(op))?;
        let tasks: Vec<TransferTask> = entries
            .iter()
            .map(|entry| TransferTask {
                source: src.join(&entry.relative_path),
                destination: dst.join(&entry.relative_path),
                kind: entry.kind,
                depth: entry.depth(),
            })
            .collect();
        debug!(source = %src, dest = %dst, tasks = tasks.len(), limit, accelerated, "tree planned");

        let scheduler = ConcurrencyLimitedScheduler::new(limit);
        let outcomes = scheduler
            .run(tasks, |task| {
                self.execute(task, accelerated, options.events.as_ref())
            })
            .await;

        if let Some(err) = outcomes.iter().find_map(|o| o.result.as_ref().err()) {
            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            error!(source = %src, dest = %dst, failed, error = %err, "{op} failed");
            return Err(err.clone());
        }

        let summary = summarize(&outcomes);
        info!(
            source = %src,
            dest = %dst,
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "{op} completed"
        );
        Ok(TreeRun {
            source: src.clone(),
            destination: dst.clone(),
            outcomes,
            summary,
        })
    }

    /// Checks that `dst` can receive a tree.
    ///
    /// Walks up to the nearest existing entry, which must be a writable
    /// directory. Every failure here is [`ErrorKind::BadPath`], permission
    /// problems included.
    async fn validate_destination(&self, dst: &CanonicalPath) -> Result<()> {
        let op = self.direction.op();
        let bad = |detail: &str| {
            SftpError::new(ErrorKind::BadPath, op, dst.as_str()).with_detail(detail)
        };

        let mut candidate = Some(dst.clone());
        while let Some(current) = candidate {
            match self.destination.stat(current.as_str()).await {
                Ok(stat) if !stat.kind.is_dir() => {
                    return Err(bad(if current == *dst {
                        "destination is not a directory"
                    } else {
                        "path component is not a directory"
                    }));
                }
                Ok(_) => {
                    return match self.destination.writable(current.as_str()).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(bad("destination is not writable")),
                        Err(e) if e.is(ErrorKind::Permission) => {
                            Err(bad("destination is not writable"))
                        }
                        Err(e) => Err(e.with_op(op)),
                    };
                }
                Err(e) if e.is(ErrorKind::NotFound) => candidate = current.parent(),
                Err(e) if e.is(ErrorKind::NotADirectory) => {
                    return Err(bad("path component is not a directory"));
                }
                Err(e) if e.is(ErrorKind::Permission) => {
                    return Err(bad("destination is not accessible"));
                }
                Err(e) => return Err(e.with_op(op)),
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        task: TransferTask,
        accelerated: bool,
        events: Option<&mpsc::Sender<TransferEvent>>,
    ) -> TransferOutcome {
        let op = self.direction.op();
        let result = match task.kind {
            FileKind::Directory => ensure_directory(self.destination, &task.destination, true)
                .await
                .map(|_| 0)
                .map_err(|e| e.with_op(op)),
            _ => {
                let req = CopyRequest {
                    source: self.source,
                    source_path: task.source.as_str(),
                    destination: self.destination,
                    destination_path: task.destination.as_str(),
                    chunk_size: self.chunk_size,
                    accelerated,
                };
                copy_file(&req, op).await
            }
        };

        match &result {
            Ok(_) if task.kind != FileKind::Directory => {
                notify(events, self.direction.event(&task.source, &task.destination));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(source = %task.source, dest = %task.destination, error = %e, "task failed");
                notify(
                    events,
                    TransferEvent::Failed {
                        source: task.source.to_string(),
                        error: e.to_string(),
                    },
                );
            }
        }
        TransferOutcome { task, result }
    }
}

fn summarize(outcomes: &[TransferOutcome]) -> TransferSummary {
    outcomes
        .iter()
        .fold(TransferSummary::default(), |mut summary, outcome| {
            if outcome.task.kind == FileKind::Directory {
                summary.directories += 1;
            } else {
                summary.files += 1;
            }
            if let Ok(bytes) = &outcome.result {
                summary.bytes += *bytes;
            }
            summary
        })
}
