//! Directory chain creation.

use sftpdir_protocol::{ErrorKind, Result, SftpError};
use sftpdir_session::TransportSession;
use tracing::debug;

use crate::path::CanonicalPath;

/// What [`ensure_directory`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkdirOutcome {
    /// The final segment was created.
    Created,
    /// The directory was already there; nothing was created.
    AlreadyExists,
}

impl MkdirOutcome {
    /// Human-readable confirmation for `path`.
    pub fn message(self, path: &CanonicalPath) -> String {
        match self {
            MkdirOutcome::Created => format!("{path} directory created"),
            MkdirOutcome::AlreadyExists => format!("{path} directory already exists"),
        }
    }
}

/// Makes sure `path` exists as a directory, walking from the root down.
///
/// Each segment is probed: an existing directory is skipped, an existing
/// non-directory fails with [`ErrorKind::BadPath`]. A missing segment is
/// created when it is the last one or `recursive` is set; otherwise the
/// call fails with [`ErrorKind::BadPath`]. A permission error from the
/// session stops the walk as [`ErrorKind::Permission`]; any other create
/// failure becomes [`ErrorKind::BadPath`].
pub async fn ensure_directory(
    session: &dyn TransportSession,
    path: &CanonicalPath,
    recursive: bool,
) -> Result<MkdirOutcome> {
    let target = path.as_str();
    let segments = path.prefixes();
    let last = segments.len().saturating_sub(1);
    let mut outcome = MkdirOutcome::AlreadyExists;

    for (idx, segment) in segments.iter().enumerate() {
        let seg = segment.as_str();
        match session.stat(seg).await {
            Ok(stat) if stat.kind.is_dir() => continue,
            Ok(_) => {
                return Err(SftpError::new(ErrorKind::BadPath, "mkdir", target)
                    .with_detail(format!("path component is not a directory: {seg}")));
            }
            Err(e) if e.is(ErrorKind::NotFound) => {}
            Err(e) if e.is(ErrorKind::NotADirectory) => {
                return Err(SftpError::new(ErrorKind::BadPath, "mkdir", target)
                    .with_detail(format!("path component is not a directory: {seg}")));
            }
            Err(e) if e.is(ErrorKind::Permission) => {
                return Err(SftpError::new(ErrorKind::Permission, "mkdir", target));
            }
            Err(e) => return Err(e.with_op("mkdir")),
        }

        if idx != last && !recursive {
            return Err(SftpError::new(ErrorKind::BadPath, "mkdir", target)
                .with_detail(format!("parent directory does not exist: {seg}")));
        }

        match session.mkdir(seg).await {
            Ok(()) => {
                debug!(path = seg, "created directory");
                if idx == last {
                    outcome = MkdirOutcome::Created;
                }
            }
            Err(e) if e.is(ErrorKind::Permission) => {
                return Err(SftpError::new(ErrorKind::Permission, "mkdir", target));
            }
            Err(e) if e.is(ErrorKind::Connection) => return Err(e.with_op("mkdir")),
            Err(e) => {
                // Another task may have created it in the meantime.
                if matches!(session.stat(seg).await, Ok(stat) if stat.kind.is_dir()) {
                    continue;
                }
                let detail = e.detail().unwrap_or(e.kind().as_str()).to_string();
                return Err(
                    SftpError::new(ErrorKind::BadPath, "mkdir", target).with_detail(detail),
                );
            }
        }
    }

    Ok(outcome)
}
