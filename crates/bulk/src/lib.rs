//! Bulk directory transfer over a single transport session.
//!
//! # Pipeline
//!
//! 1. **Resolve**: user paths become canonical paths in their namespace
//!    ([`PathResolver`])
//! 2. **Walk**: the source tree is enumerated depth-first, pruned by the
//!    caller's filter ([`DirectoryWalker`])
//! 3. **Plan**: each directory becomes a mkdir task, each file a copy task
//! 4. **Run**: tasks execute in depth waves with bounded concurrency
//!    ([`ConcurrencyLimitedScheduler`]); directories are created with
//!    [`ensure_directory`]
//! 5. **Report**: a confirmation string, or the first failure in
//!    submission order ([`BulkTransferEngine`])

pub mod client;
pub mod config;
pub mod engine;
pub mod mkdir;
pub mod path;
pub mod scheduler;
pub mod types;
pub mod walker;

pub use client::SftpClient;
pub use config::{ClientConfig, ConfigError, DEFAULT_CONCURRENCY_LIMIT};
pub use engine::{BulkTransferEngine, Direction};
pub use mkdir::{MkdirOutcome, ensure_directory};
pub use path::{CanonicalPath, Namespace, PathResolver};
pub use scheduler::ConcurrencyLimitedScheduler;
pub use types::{
    Filter, TransferEvent, TransferOptions, TransferOutcome, TransferSummary, TransferTask,
    TreeEntry, TreeRun, filter,
};
pub use walker::DirectoryWalker;
