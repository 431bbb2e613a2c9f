use sftpdir_protocol::{ErrorKind, FileKind, Result, SftpError, WriteMode};
use sftpdir_session::TransportSession;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::copy::pump;

/// Reads a whole file into memory.
pub async fn get(session: &dyn TransportSession, path: &str, chunk_size: usize) -> Result<Vec<u8>> {
    let stat = session.stat(path).await.map_err(|e| e.with_op("get"))?;
    if !stat.kind.is_file() {
        return Err(SftpError::new(ErrorKind::NotRegularFile, "get", path));
    }
    session
        .read_file(path, chunk_size)
        .await
        .map_err(|e| e.with_op("get"))
}

/// Streams a file into a caller-owned sink. Returns bytes written.
///
/// The sink is borrowed: it is flushed on success and never shut down, so
/// on failure it stays open and usable by the caller.
pub async fn get_into<W>(
    session: &dyn TransportSession,
    path: &str,
    sink: &mut W,
    chunk_size: usize,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = session
        .open_read(path)
        .await
        .map_err(|e| e.with_op("get"))?;
    pump(&mut stream, sink, chunk_size, "get", path, "<sink>").await
}

/// Writes `data` to `path`, creating or truncating it.
pub async fn put(
    session: &dyn TransportSession,
    data: &[u8],
    path: &str,
    chunk_size: usize,
) -> Result<()> {
    session
        .write_file(path, data, chunk_size)
        .await
        .map_err(|e| e.with_op("put"))
}

/// Appends `data` to `path`, creating the file if needed.
pub async fn append(session: &dyn TransportSession, data: &[u8], path: &str) -> Result<u64> {
    match session.stat(path).await {
        Ok(stat) if stat.kind.is_dir() => {
            return Err(SftpError::new(ErrorKind::BadPath, "append", path)
                .with_detail("cannot append to a directory"));
        }
        Ok(_) => {}
        Err(e) if e.is(ErrorKind::NotFound) => {}
        Err(e) => return Err(e.with_op("append")),
    }

    let mut sink = session
        .open_write(path, WriteMode::Append)
        .await
        .map_err(|e| e.with_op("append"))?;
    sink.write_all(data)
        .await
        .map_err(|e| SftpError::from_io("append", path, &e))?;
    sink.shutdown()
        .await
        .map_err(|e| SftpError::from_io("append", path, &e))?;
    debug!(path, bytes = data.len(), "appended");
    Ok(data.len() as u64)
}

/// Reports what kind of entry `path` is, or `None` if there is nothing
/// there.
///
/// A missing ancestor also yields `None`. Entries that are neither files,
/// directories nor symlinks are reported as absent.
pub async fn exists(session: &dyn TransportSession, path: &str) -> Result<Option<FileKind>> {
    match session.stat(path).await {
        Ok(stat) => Ok(match stat.kind {
            FileKind::Other => None,
            kind => Some(kind),
        }),
        Err(e) if e.is(ErrorKind::NotFound) || e.is(ErrorKind::NotADirectory) => Ok(None),
        Err(e) => Err(e.with_op("exists")),
    }
}
