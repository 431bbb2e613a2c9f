//! Local filesystem behind the session trait.

use std::fs::Metadata;

use sftpdir_protocol::{DirEntry, ErrorKind, FileKind, FileStat, Result, SftpError, WriteMode};
use tracing::trace;

use crate::{ReadStream, SessionFuture, TransportSession, WriteSink};

/// The local filesystem, addressed with absolute `/`-separated paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

fn kind_of(meta: &Metadata) -> FileKind {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_file() {
        FileKind::File
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Other
    }
}

#[cfg(unix)]
fn permissions_of(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permissions_of(meta: &Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, false) => 0o755,
        (true, true) => 0o555,
        (false, false) => 0o644,
        (false, true) => 0o444,
    }
}

/// Whether the calling process may write to `path`, as decided by the
/// kernel.
#[cfg(unix)]
async fn access_writable(path: &str) -> Result<bool> {
    use rustix::fs::{Access, access};
    use rustix::io::Errno;

    let owned = path.to_string();
    let result = tokio::task::spawn_blocking(move || access(owned.as_str(), Access::WRITE_OK))
        .await
        .map_err(|e| {
            SftpError::new(ErrorKind::Failure, "access", path).with_detail(e.to_string())
        })?;
    match result {
        Ok(()) => Ok(true),
        Err(errno) if errno == Errno::ACCESS || errno == Errno::PERM || errno == Errno::ROFS => {
            Ok(false)
        }
        Err(errno) => Err(SftpError::from_io("access", path, &std::io::Error::from(errno))),
    }
}

#[cfg(not(unix))]
async fn access_writable(_path: &str) -> Result<bool> {
    Ok(true)
}

fn stat_of(meta: &Metadata) -> FileStat {
    FileStat {
        kind: kind_of(meta),
        size: meta.len(),
        permissions: permissions_of(meta),
    }
}

impl TransportSession for LocalFs {
    fn label(&self) -> &str {
        "local"
    }

    fn cwd(&self) -> SessionFuture<'_, String> {
        Box::pin(async move {
            let dir = std::env::current_dir().map_err(|e| SftpError::from_io("cwd", ".", &e))?;
            Ok(dir.to_string_lossy().into_owned())
        })
    }

    fn stat<'a>(&'a self, path: &'a str) -> SessionFuture<'a, FileStat> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(path)
                .await
                .map_err(|e| SftpError::from_io("stat", path, &e))?;
            Ok(stat_of(&meta))
        })
    }

    fn list<'a>(&'a self, path: &'a str) -> SessionFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            let mut dir = tokio::fs::read_dir(path)
                .await
                .map_err(|e| SftpError::from_io("list", path, &e))?;

            let mut entries = Vec::new();
            while let Some(entry) = dir
                .next_entry()
                .await
                .map_err(|e| SftpError::from_io("list", path, &e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                // Links are not followed; they list as `Symlink`.
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| SftpError::from_io("list", path, &e))?;
                let (kind, size) = (kind_of(&meta), meta.len());
                entries.push(DirEntry { name, kind, size });
            }
            trace!(path, count = entries.len(), "local list");
            Ok(entries)
        })
    }

    /// Requires both the owner write bit and write access for the calling
    /// process, so a read-only mode is honoured even when running as root.
    fn writable<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            let stat = self.stat(path).await?;
            if !stat.owner_writable() {
                return Ok(false);
            }
            access_writable(path).await
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::create_dir(path)
                .await
                .map_err(|e| SftpError::from_io("mkdir", path, &e))
        })
    }

    fn rmdir<'a>(&'a self, path: &'a str, recursive: bool) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let stat = self.stat(path).await.map_err(|e| e.with_op("rmdir"))?;
            if !stat.kind.is_dir() {
                return Err(SftpError::new(ErrorKind::NotADirectory, "rmdir", path));
            }
            let result = if recursive {
                tokio::fs::remove_dir_all(path).await
            } else {
                tokio::fs::remove_dir(path).await
            };
            result.map_err(|e| SftpError::from_io("rmdir", path, &e))
        })
    }

    fn open_read<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ReadStream> {
        Box::pin(async move {
            let stat = self.stat(path).await.map_err(|e| e.with_op("open"))?;
            if stat.kind.is_dir() {
                return Err(SftpError::new(ErrorKind::NotRegularFile, "open", path));
            }
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| SftpError::from_io("open", path, &e))?;
            Ok(Box::new(file) as ReadStream)
        })
    }

    fn open_write<'a>(&'a self, path: &'a str, mode: WriteMode) -> SessionFuture<'a, WriteSink> {
        Box::pin(async move {
            let mut options = tokio::fs::OpenOptions::new();
            options.create(true);
            match mode {
                WriteMode::Truncate => options.write(true).truncate(true),
                WriteMode::Append => options.append(true),
            };
            let file = options
                .open(path)
                .await
                .map_err(|e| SftpError::from_io("open", path, &e))?;
            Ok(Box::new(file) as WriteSink)
        })
    }

    fn remove<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| SftpError::from_io("delete", path, &e))
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::rename(from, to)
                .await
                .map_err(|e| SftpError::from_io("rename", from, &e))
        })
    }
}
