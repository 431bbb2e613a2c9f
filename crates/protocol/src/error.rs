//! Error taxonomy.
//!
//! Failures are classified by [`ErrorKind`] rather than by type. Every
//! error also carries the name of the operation that failed and the path
//! it failed on, and renders as `"{op}: {kind} {path}"`.

use std::fmt;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Source path or a required ancestor does not exist.
    NotFound,
    /// Destination conflict, malformed create target, or an unwritable
    /// destination.
    BadPath,
    /// The transport reported access denied on an existing target.
    Permission,
    /// A directory was expected but a file was found.
    NotADirectory,
    /// A regular file was expected but a directory was found.
    NotRegularFile,
    /// Structurally malformed path input.
    InvalidPath,
    /// The session was closed or the connection dropped.
    Connection,
    /// Generic server-side failure with no more specific kind.
    Failure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "No such file",
            ErrorKind::BadPath => "Bad path",
            ErrorKind::Permission => "Permission denied",
            ErrorKind::NotADirectory => "Not a directory",
            ErrorKind::NotRegularFile => "Not a regular file",
            ErrorKind::InvalidPath => "Invalid path",
            ErrorKind::Connection => "Connection lost",
            ErrorKind::Failure => "Failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind as Io;
        match kind {
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::Permission,
            Io::NotADirectory => ErrorKind::NotADirectory,
            Io::IsADirectory | Io::AlreadyExists => ErrorKind::BadPath,
            Io::InvalidInput => ErrorKind::InvalidPath,
            Io::BrokenPipe
            | Io::NotConnected
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::UnexpectedEof => ErrorKind::Connection,
            _ => ErrorKind::Failure,
        }
    }
}

/// A classified failure of a session or transfer operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op}: {kind} {path}{}", detail_suffix(.detail))]
pub struct SftpError {
    kind: ErrorKind,
    op: String,
    path: String,
    detail: Option<String>,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(" ({d})"),
        None => String::new(),
    }
}

impl SftpError {
    pub fn new(kind: ErrorKind, op: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            op: op.into(),
            path: path.into(),
            detail: None,
        }
    }

    /// Classifies an I/O error raised while performing `op` on `path`.
    pub fn from_io(op: impl Into<String>, path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::new(ErrorKind::from(err.kind()), op, path).with_detail(err.to_string())
    }

    /// Attaches a human-readable detail, shown in parentheses.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Re-labels the operation, keeping kind, path and detail.
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = op.into();
        self
    }

    /// Re-classifies the error, keeping everything else.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}
