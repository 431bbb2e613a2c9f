use sftpdir_protocol::{ErrorKind, Result, SftpError, WriteMode};
use sftpdir_session::{TransportSession, parent_of};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// A single file copy between two sessions.
///
/// Either side may be the local filesystem or a remote; a download is a
/// copy from the remote session to [`LocalFs`], an upload the reverse.
///
/// [`LocalFs`]: sftpdir_session::LocalFs
#[derive(Clone, Copy)]
pub struct CopyRequest<'a> {
    pub source: &'a dyn TransportSession,
    pub source_path: &'a str,
    pub destination: &'a dyn TransportSession,
    pub destination_path: &'a str,
    pub chunk_size: usize,
    /// Use the bulk read/write primitives instead of streaming.
    pub accelerated: bool,
}

/// Copies bytes from `reader` to `writer` through a `chunk_size` buffer.
///
/// Read failures are attributed to `src`, write failures to `dst`. The
/// writer is flushed but not shut down.
pub(crate) async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    op: &str,
    src: &str,
    dst: &str,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| SftpError::from_io(op, src, &e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| SftpError::from_io(op, dst, &e))?;
        total += n as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| SftpError::from_io(op, dst, &e))?;
    Ok(total)
}

/// Copies one file, truncating the destination. Returns bytes copied.
///
/// Errors are relabelled with `op` so the caller's operation name shows up
/// in the message.
pub async fn copy_file(req: &CopyRequest<'_>, op: &str) -> Result<u64> {
    debug!(
        op,
        source = req.source_path,
        dest = req.destination_path,
        accelerated = req.accelerated,
        "copying file"
    );

    if req.accelerated {
        let data = req
            .source
            .read_file(req.source_path, req.chunk_size)
            .await
            .map_err(|e| e.with_op(op))?;
        req.destination
            .write_file(req.destination_path, &data, req.chunk_size)
            .await
            .map_err(|e| e.with_op(op))?;
        return Ok(data.len() as u64);
    }

    let mut reader = req
        .source
        .open_read(req.source_path)
        .await
        .map_err(|e| e.with_op(op))?;
    let mut writer = req
        .destination
        .open_write(req.destination_path, WriteMode::Truncate)
        .await
        .map_err(|e| e.with_op(op))?;
    let copied = pump(
        &mut reader,
        &mut writer,
        req.chunk_size,
        op,
        req.source_path,
        req.destination_path,
    )
    .await?;
    writer
        .shutdown()
        .await
        .map_err(|e| SftpError::from_io(op, req.destination_path, &e))?;
    Ok(copied)
}

/// Checks that a file can be written at `path`.
///
/// Every failure is reported as [`ErrorKind::BadPath`]: the destination is
/// a directory, its parent is missing or not a directory, or the entry that
/// would be written is not writable.
pub async fn check_destination(
    session: &dyn TransportSession,
    path: &str,
    op: &str,
) -> Result<()> {
    let bad = |detail: &str| SftpError::new(ErrorKind::BadPath, op, path).with_detail(detail);

    match session.stat(path).await {
        Ok(stat) if stat.kind.is_dir() => return Err(bad("destination is a directory")),
        Ok(_) => {
            if !writable(session, path, op).await? {
                return Err(bad("destination is not writable"));
            }
        }
        Err(e) if e.is(ErrorKind::NotFound) => {}
        Err(e) if e.is(ErrorKind::NotADirectory) => {
            return Err(bad("path component is not a directory"));
        }
        Err(e) => return Err(e.with_op(op)),
    }

    let parent = parent_of(path).ok_or_else(|| bad("destination has no parent"))?;
    match session.stat(parent).await {
        Ok(stat) if !stat.kind.is_dir() => Err(bad("parent is not a directory")),
        Ok(_) => {
            if writable(session, parent, op).await? {
                Ok(())
            } else {
                Err(bad("parent directory is not writable"))
            }
        }
        Err(e) if e.is(ErrorKind::NotFound) || e.is(ErrorKind::NotADirectory) => {
            Err(bad("parent directory does not exist"))
        }
        Err(e) => Err(e.with_op(op)),
    }
}

/// Asks the session whether the caller may write to `path`. A permission
/// error counts as "no".
async fn writable(session: &dyn TransportSession, path: &str, op: &str) -> Result<bool> {
    match session.writable(path).await {
        Ok(writable) => Ok(writable),
        Err(e) if e.is(ErrorKind::Permission) => Ok(false),
        Err(e) => Err(e.with_op(op)),
    }
}

/// Accelerated single-file copy with up-front validation.
///
/// The source must be a regular file ([`ErrorKind::NotRegularFile`]
/// otherwise) and the destination must pass [`check_destination`].
pub async fn fast_copy(req: &CopyRequest<'_>, op: &str) -> Result<u64> {
    let stat = req
        .source
        .stat(req.source_path)
        .await
        .map_err(|e| e.with_op(op))?;
    if !stat.kind.is_file() {
        return Err(SftpError::new(ErrorKind::NotRegularFile, op, req.source_path));
    }
    check_destination(req.destination, req.destination_path, op).await?;
    copy_file(
        &CopyRequest {
            accelerated: true,
            ..*req
        },
        op,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sftpdir_session::{LocalFs, MemorySession};

    fn request<'a>(
        source: &'a dyn TransportSession,
        source_path: &'a str,
        destination: &'a dyn TransportSession,
        destination_path: &'a str,
    ) -> CopyRequest<'a> {
        CopyRequest {
            source,
            source_path,
            destination,
            destination_path,
            chunk_size: 1000,
            accelerated: false,
        }
    }

    #[tokio::test]
    async fn stream_copy_remote_to_local() {
        let remote = MemorySession::default();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        remote.write("/srv/large.bin", data.clone());

        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("large.bin").to_string_lossy().into_owned();
        let local = LocalFs::new();

        let copied = copy_file(&request(&remote, "/srv/large.bin", &local, &dst), "get")
            .await
            .unwrap();
        assert_eq!(copied, 5000);
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[tokio::test]
    async fn accelerated_copy_between_remotes() {
        let a = MemorySession::default();
        let b = MemorySession::default();
        a.write("/f.txt", b"fast get small text".to_vec());

        let req = CopyRequest {
            accelerated: true,
            ..request(&a, "/f.txt", &b, "/g.txt")
        };
        copy_file(&req, "fastGet").await.unwrap();
        assert_eq!(b.read("/g.txt").unwrap(), b"fast get small text");
    }

    #[tokio::test]
    async fn copy_missing_source_keeps_op_name() {
        let a = MemorySession::default();
        let b = MemorySession::default();
        let err = copy_file(&request(&a, "/file-not-exist.txt", &b, "/x"), "get")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
        assert!(err.to_string().starts_with("get: No such file"));
    }

    #[tokio::test]
    async fn fast_copy_of_directory_is_not_regular_file() {
        let a = MemorySession::default();
        let b = MemorySession::default();
        a.create_dir_all("/srv/dir");
        let err = fast_copy(&request(&a, "/srv/dir", &b, "/dir"), "fastGet")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotRegularFile));
        assert!(err.to_string().contains("Not a regular file"));
    }

    #[tokio::test]
    async fn fast_copy_to_missing_parent_is_bad_path() {
        let a = MemorySession::default();
        let b = MemorySession::default();
        a.write("/f", b"x".to_vec());
        let err = fast_copy(&request(&a, "/f", &b, "/no/such/dir/f"), "fastGet")
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::BadPath));
        assert_eq!(b.kind("/no"), None);
    }

    #[tokio::test]
    async fn destination_checks() {
        let s = MemorySession::default();
        s.create_dir_all("/dir");
        s.write("/file", b"x".to_vec());
        s.create_dir_all("/locked");
        s.set_mode("/locked", 0o555);

        check_destination(&s, "/dir/new", "get").await.unwrap();
        check_destination(&s, "/file", "get").await.unwrap();

        for path in ["/dir", "/file/below", "/locked/new", "/missing/new"] {
            let err = check_destination(&s, path, "get").await.unwrap_err();
            assert!(err.is(ErrorKind::BadPath), "{path}: {err}");
            assert!(err.to_string().contains("Bad path"));
        }
    }

    #[tokio::test]
    async fn destination_owned_by_another_user_is_bad_path() {
        let s = MemorySession::default();
        s.create_dir_all("/opt");
        s.write("/opt/existing.txt", b"x".to_vec());
        s.set_foreign_owner("/opt");
        s.set_foreign_owner("/opt/existing.txt");

        for path in ["/opt/new.txt", "/opt/existing.txt"] {
            let err = check_destination(&s, path, "put").await.unwrap_err();
            assert!(err.is(ErrorKind::BadPath), "{path}: {err}");
        }
    }
}
