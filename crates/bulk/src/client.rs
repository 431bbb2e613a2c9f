//! Client facade.
//!
//! [`SftpClient`] pairs a remote session with the local filesystem,
//! resolves user paths in both namespaces and exposes directory and
//! single-file operations with human-readable confirmations.

use std::sync::Arc;

use sftpdir_protocol::{FileKind, FileStat, Result, SftpError};
use sftpdir_session::{LocalFs, TransportSession};
use sftpdir_transfer::{CopyRequest, check_destination, copy_file, fast_copy};
use tokio::io::AsyncWrite;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::engine::{BulkTransferEngine, Direction};
use crate::mkdir::ensure_directory;
use crate::path::{CanonicalPath, Namespace, PathResolver};
use crate::types::{TransferOptions, TreeRun};

/// A remote session plus the local filesystem.
pub struct SftpClient {
    remote: Arc<dyn TransportSession>,
    local: LocalFs,
    config: ClientConfig,
    remote_cwd: OnceCell<String>,
}

impl SftpClient {
    pub fn new(remote: Arc<dyn TransportSession>) -> Self {
        Self::with_config(remote, ClientConfig::default())
    }

    pub fn with_config(remote: Arc<dyn TransportSession>, config: ClientConfig) -> Self {
        Self {
            remote,
            local: LocalFs::new(),
            config,
            remote_cwd: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &dyn TransportSession {
        &*self.remote
    }

    /// The remote working directory, fetched once per client.
    pub async fn remote_cwd(&self) -> Result<&str> {
        let cwd = self
            .remote_cwd
            .get_or_try_init(|| async {
                let cwd = self.remote.cwd().await?;
                debug!(cwd = %cwd, "remote working directory");
                Ok::<_, SftpError>(cwd)
            })
            .await?;
        Ok(cwd.as_str())
    }

    pub async fn resolve_remote(&self, raw: &str) -> Result<CanonicalPath> {
        let cwd = self.remote_cwd().await?;
        PathResolver::new(Namespace::Remote, cwd)?.resolve(raw)
    }

    /// Resolves a local path against the process working directory.
    pub fn resolve_local(&self, raw: &str) -> Result<CanonicalPath> {
        let cwd = std::env::current_dir().map_err(|e| SftpError::from_io("resolve", raw, &e))?;
        PathResolver::new(Namespace::Local, &cwd.to_string_lossy())?.resolve(raw)
    }

    /// Fills unset options from the client configuration.
    fn effective(&self, mut options: TransferOptions) -> TransferOptions {
        let limit = options
            .concurrency_limit
            .unwrap_or(self.config.concurrency_limit);
        options.concurrency_limit = Some(limit.max(1));
        options
            .use_accelerated_transfer
            .get_or_insert(self.config.use_accelerated_transfer);
        options
    }

    fn engine(&self, direction: Direction) -> BulkTransferEngine<'_> {
        let remote: &dyn TransportSession = &*self.remote;
        let local: &dyn TransportSession = &self.local;
        let (source, destination) = match direction {
            Direction::Download => (remote, local),
            Direction::Upload => (local, remote),
        };
        BulkTransferEngine::new(source, destination, direction)
            .with_chunk_size(self.config.chunk_size)
    }

    /// Downloads the remote tree at `remote` into `local`.
    pub async fn download_dir(
        &self,
        remote: &str,
        local: &str,
        options: TransferOptions,
    ) -> Result<String> {
        let src = self.resolve_remote(remote).await?;
        let dst = self.resolve_local(local)?;
        self.engine(Direction::Download)
            .transfer(&src, &dst, &self.effective(options))
            .await
    }

    /// Uploads the local tree at `local` into `remote`.
    pub async fn upload_dir(
        &self,
        local: &str,
        remote: &str,
        options: TransferOptions,
    ) -> Result<String> {
        let src = self.resolve_local(local)?;
        let dst = self.resolve_remote(remote).await?;
        self.engine(Direction::Upload)
            .transfer(&src, &dst, &self.effective(options))
            .await
    }

    /// Like [`download_dir`](Self::download_dir) but returns per-task
    /// outcomes and totals.
    pub async fn download_dir_run(
        &self,
        remote: &str,
        local: &str,
        options: TransferOptions,
    ) -> Result<TreeRun> {
        let src = self.resolve_remote(remote).await?;
        let dst = self.resolve_local(local)?;
        self.engine(Direction::Download)
            .run_tree(&src, &dst, &self.effective(options))
            .await
    }

    /// Like [`upload_dir`](Self::upload_dir) but returns per-task outcomes
    /// and totals.
    pub async fn upload_dir_run(
        &self,
        local: &str,
        remote: &str,
        options: TransferOptions,
    ) -> Result<TreeRun> {
        let src = self.resolve_local(local)?;
        let dst = self.resolve_remote(remote).await?;
        self.engine(Direction::Upload)
            .run_tree(&src, &dst, &self.effective(options))
            .await
    }

    /// Creates a remote directory, optionally with its missing parents.
    pub async fn mkdir(&self, path: &str, recursive: bool) -> Result<String> {
        let path = self.resolve_remote(path).await?;
        let outcome = ensure_directory(&*self.remote, &path, recursive).await?;
        info!(path = %path, ?outcome, "mkdir");
        Ok(outcome.message(&path))
    }

    /// Removes a remote directory. Without `recursive` it must be empty.
    pub async fn rmdir(&self, path: &str, recursive: bool) -> Result<String> {
        let path = self.resolve_remote(path).await?;
        self.remote
            .rmdir(path.as_str(), recursive)
            .await
            .map_err(|e| e.with_op("rmdir"))?;
        info!(path = %path, recursive, "rmdir");
        Ok(format!("{path} directory removed"))
    }

    pub async fn exists(&self, path: &str) -> Result<Option<FileKind>> {
        let path = self.resolve_remote(path).await?;
        sftpdir_transfer::exists(&*self.remote, path.as_str()).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        let path = self.resolve_remote(path).await?;
        self.remote.stat(path.as_str()).await
    }

    /// Reads a remote file into memory.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let path = self.resolve_remote(path).await?;
        sftpdir_transfer::get(&*self.remote, path.as_str(), self.config.chunk_size).await
    }

    /// Streams a remote file into `sink`. The sink is left open on both
    /// success and failure.
    pub async fn get_into<W>(&self, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.resolve_remote(path).await?;
        sftpdir_transfer::get_into(&*self.remote, path.as_str(), sink, self.config.chunk_size)
            .await
    }

    fn download_request<'a>(&'a self, src: &'a str, dst: &'a str) -> CopyRequest<'a> {
        CopyRequest {
            source: &*self.remote,
            source_path: src,
            destination: &self.local,
            destination_path: dst,
            chunk_size: self.config.chunk_size,
            accelerated: false,
        }
    }

    fn upload_request<'a>(&'a self, src: &'a str, dst: &'a str) -> CopyRequest<'a> {
        CopyRequest {
            source: &self.local,
            source_path: src,
            destination: &*self.remote,
            destination_path: dst,
            chunk_size: self.config.chunk_size,
            accelerated: false,
        }
    }

    /// Streams a remote file to a local path.
    pub async fn get_file(&self, remote: &str, local: &str) -> Result<String> {
        let src = self.resolve_remote(remote).await?;
        let dst = self.resolve_local(local)?;
        check_destination(&self.local, dst.as_str(), "get").await?;
        copy_file(&self.download_request(src.as_str(), dst.as_str()), "get").await?;
        Ok(format!("{src} was successfully downloaded to {dst}"))
    }

    /// Copies a remote file to a local path with the accelerated
    /// primitive.
    pub async fn fast_get(&self, remote: &str, local: &str) -> Result<String> {
        let src = self.resolve_remote(remote).await?;
        let dst = self.resolve_local(local)?;
        fast_copy(&self.download_request(src.as_str(), dst.as_str()), "fastGet").await?;
        Ok(format!("{src} was successfully downloaded to {dst}"))
    }

    /// Writes `data` to a remote file.
    pub async fn put(&self, data: &[u8], remote: &str) -> Result<String> {
        let dst = self.resolve_remote(remote).await?;
        sftpdir_transfer::put(&*self.remote, data, dst.as_str(), self.config.chunk_size).await?;
        Ok(format!("Uploaded data to {dst}"))
    }

    /// Streams a local file to a remote path.
    pub async fn put_file(&self, local: &str, remote: &str) -> Result<String> {
        let src = self.resolve_local(local)?;
        let dst = self.resolve_remote(remote).await?;
        check_destination(&*self.remote, dst.as_str(), "put").await?;
        copy_file(&self.upload_request(src.as_str(), dst.as_str()), "put").await?;
        Ok(format!("{src} was successfully uploaded to {dst}"))
    }

    /// Copies a local file to a remote path with the accelerated
    /// primitive.
    pub async fn fast_put(&self, local: &str, remote: &str) -> Result<String> {
        let src = self.resolve_local(local)?;
        let dst = self.resolve_remote(remote).await?;
        fast_copy(&self.upload_request(src.as_str(), dst.as_str()), "fastPut").await?;
        Ok(format!("{src} was successfully uploaded to {dst}"))
    }

    /// Appends `data` to a remote file, creating it if needed.
    pub async fn append(&self, data: &[u8], remote: &str) -> Result<String> {
        let dst = self.resolve_remote(remote).await?;
        sftpdir_transfer::append(&*self.remote, data, dst.as_str()).await?;
        Ok(format!("Appended data to {dst}"))
    }
}
