//! Shared types for sftpdir sessions and transfers.
//!
//! Every crate in the workspace speaks in terms of these types: file
//! metadata returned by a session, the write modes a session accepts, and
//! the error taxonomy used to classify failures.

pub mod error;
pub mod types;

pub use error::{ErrorKind, SftpError};
pub use types::{DirEntry, FileKind, FileStat, WriteMode};

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SftpError>;
