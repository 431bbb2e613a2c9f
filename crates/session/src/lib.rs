//! Transport sessions.
//!
//! [`TransportSession`] is the seam between the transfer engine and
//! whatever carries the bytes. A remote SFTP channel implements it in the
//! application; this crate ships two implementations of its own:
//!
//! - [`LocalFs`] exposes the local filesystem through the same trait, so
//!   uploads and downloads are the same tree copy with the roles swapped.
//! - [`MemorySession`] is an in-memory remote with permission bits,
//!   optional per-request latency and a severable connection.

mod local;
mod memory;

use std::future::Future;
use std::pin::Pin;

use sftpdir_protocol::{DirEntry, FileStat, Result, SftpError, WriteMode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use local::LocalFs;
pub use memory::MemorySession;

/// Boxed future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Readable byte stream for an open file.
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte sink for an open file.
pub type WriteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected, authenticated file-access session.
///
/// Every operation is a single-shot request. Paths are absolute and
/// normalized by the caller. Streams returned by [`open_read`] and
/// [`open_write`] release the remote handle when dropped.
///
/// [`open_read`]: TransportSession::open_read
/// [`open_write`]: TransportSession::open_write
pub trait TransportSession: Send + Sync {
    /// Short label for log output (`"local"`, `"remote"`, ...).
    fn label(&self) -> &str;

    /// Returns the session's working directory.
    fn cwd(&self) -> SessionFuture<'_, String>;

    fn stat<'a>(&'a self, path: &'a str) -> SessionFuture<'a, FileStat>;

    /// Lists a directory in the order the server returns entries.
    fn list<'a>(&'a self, path: &'a str) -> SessionFuture<'a, Vec<DirEntry>>;

    /// Creates a single directory. The parent must exist.
    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()>;

    fn rmdir<'a>(&'a self, path: &'a str, recursive: bool) -> SessionFuture<'a, ()>;

    fn open_read<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ReadStream>;

    fn open_write<'a>(&'a self, path: &'a str, mode: WriteMode) -> SessionFuture<'a, WriteSink>;

    fn remove<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()>;

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> SessionFuture<'a, ()>;

    /// Returns `true` if the caller may write to the entry at `path`.
    ///
    /// The default looks only at the owner write bit.
    fn writable<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move { Ok(self.stat(path).await?.owner_writable()) })
    }

    /// Bulk read of a whole file in `chunk_size` pieces.
    ///
    /// Implementations with a pipelined read primitive override this.
    fn read_file<'a>(&'a self, path: &'a str, chunk_size: usize) -> SessionFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let mut stream = self.open_read(path).await?;
            let mut data = Vec::new();
            let mut buf = vec![0u8; chunk_size.max(1)];
            loop {
                let n = stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| SftpError::from_io("read", path, &e))?;
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }
            Ok(data)
        })
    }

    /// Bulk write of a whole file in `chunk_size` pieces, truncating.
    fn write_file<'a>(
        &'a self,
        path: &'a str,
        data: &'a [u8],
        chunk_size: usize,
    ) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let mut sink = self.open_write(path, WriteMode::Truncate).await?;
            for chunk in data.chunks(chunk_size.max(1)) {
                sink.write_all(chunk)
                    .await
                    .map_err(|e| SftpError::from_io("write", path, &e))?;
            }
            sink.shutdown()
                .await
                .map_err(|e| SftpError::from_io("write", path, &e))
        })
    }
}

/// Returns the parent of an absolute path (`"/"` for top-level entries).
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Joins a child name onto an absolute directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
