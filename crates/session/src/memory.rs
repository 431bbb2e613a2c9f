//! In-memory remote session.
//!
//! Behaves like a small SFTP server: directories carry permission bits
//! that gate listing (`r`) and child creation (`w`), listings come back in
//! creation order, and [`MemorySession::close`] severs the connection so
//! that every pending and future request fails with
//! [`ErrorKind::Connection`].

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use sftpdir_protocol::{DirEntry, ErrorKind, FileKind, FileStat, Result, SftpError, WriteMode};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::{ReadStream, SessionFuture, TransportSession, WriteSink, join, parent_of};

const DEFAULT_DIR_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug)]
enum NodeData {
    Dir { children: Vec<String> },
    File { data: Vec<u8> },
}

#[derive(Debug)]
struct Node {
    data: NodeData,
    mode: u32,
    /// Owned by another user: only the "other" bits apply to this session.
    foreign: bool,
}

impl Node {
    fn dir(mode: u32) -> Self {
        Self {
            data: NodeData::Dir {
                children: Vec::new(),
            },
            mode,
            foreign: false,
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Self {
            data: NodeData::File { data },
            mode: DEFAULT_FILE_MODE,
            foreign: false,
        }
    }

    fn kind(&self) -> FileKind {
        match self.data {
            NodeData::Dir { .. } => FileKind::Directory,
            NodeData::File { .. } => FileKind::File,
        }
    }

    fn size(&self) -> u64 {
        match &self.data {
            NodeData::Dir { .. } => 0,
            NodeData::File { data } => data.len() as u64,
        }
    }

    fn readable(&self) -> bool {
        let bit = if self.foreign { 0o004 } else { 0o400 };
        self.mode & bit != 0
    }

    fn writable(&self) -> bool {
        let bit = if self.foreign { 0o002 } else { 0o200 };
        self.mode & bit != 0
    }

    fn stat(&self) -> FileStat {
        FileStat {
            kind: self.kind(),
            size: self.size(),
            permissions: self.mode,
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<String, Node>,
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl Tree {
    fn with_root() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::dir(DEFAULT_DIR_MODE));
        Self { nodes }
    }

    /// Inserts `node` at `path` and links it into its parent's children.
    fn insert(&mut self, path: &str, node: Node) {
        if let Some(children) = parent_of(path).and_then(|p| self.children_mut(p)) {
            let name = name_of(path).to_string();
            if !children.contains(&name) {
                children.push(name);
            }
        }
        self.nodes.insert(path.to_string(), node);
    }

    fn children_mut(&mut self, path: &str) -> Option<&mut Vec<String>> {
        match self.nodes.get_mut(path) {
            Some(Node {
                data: NodeData::Dir { children },
                ..
            }) => Some(children),
            _ => None,
        }
    }

    /// Removes `path` and everything below it.
    fn remove_subtree(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.nodes
            .retain(|key, _| key.as_str() != path && !key.starts_with(&prefix));
        if let Some(children) = parent_of(path).and_then(|p| self.children_mut(p)) {
            let name = name_of(path);
            children.retain(|c| c != name);
        }
    }

    /// Checks that the parent of `path` exists, is a directory and is
    /// writable.
    fn check_parent_writable(&self, op: &str, path: &str) -> Result<()> {
        let parent = parent_of(path)
            .ok_or_else(|| SftpError::new(ErrorKind::BadPath, op, path))?;
        match self.nodes.get(parent) {
            None => Err(SftpError::new(ErrorKind::NotFound, op, path)),
            Some(node) if node.kind() != FileKind::Directory => {
                Err(SftpError::new(ErrorKind::NotFound, op, path))
            }
            Some(node) if !node.writable() => {
                Err(SftpError::new(ErrorKind::Permission, op, path))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Decrements the in-flight counter when a request finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An in-memory remote filesystem reached through a simulated session.
#[derive(Debug)]
pub struct MemorySession {
    tree: Arc<Mutex<Tree>>,
    closed: Arc<AtomicBool>,
    cwd: String,
    latency: Option<Duration>,
    requests: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemorySession {
    /// Creates a session whose working directory is `cwd` (created if
    /// missing).
    pub fn new(cwd: &str) -> Self {
        let session = Self {
            tree: Arc::new(Mutex::new(Tree::with_root())),
            closed: Arc::new(AtomicBool::new(false)),
            cwd: cwd.to_string(),
            latency: None,
            requests: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        };
        session.create_dir_all(cwd);
        session
    }

    /// Delays every request by `latency`, letting concurrent requests
    /// overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Severs the connection. Every later request and every open stream
    /// fails with a connection error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Total number of requests served.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Creates `path` and any missing ancestors, bypassing permissions.
    pub fn create_dir_all(&self, path: &str) {
        let mut tree = self.tree();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if !tree.nodes.contains_key(&current) {
                tree.insert(&current, Node::dir(DEFAULT_DIR_MODE));
            }
        }
    }

    /// Writes a file, creating missing ancestors and bypassing permissions.
    pub fn write(&self, path: &str, data: impl Into<Vec<u8>>) {
        if let Some(parent) = parent_of(path) {
            self.create_dir_all(parent);
        }
        self.tree().insert(path, Node::file(data.into()));
    }

    /// Returns the contents of a file, if present.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match &self.tree().nodes.get(path)?.data {
            NodeData::File { data } => Some(data.clone()),
            NodeData::Dir { .. } => None,
        }
    }

    /// Returns the kind of the entry at `path`, if present.
    pub fn kind(&self, path: &str) -> Option<FileKind> {
        self.tree().nodes.get(path).map(Node::kind)
    }

    /// Sets permission bits on an existing entry.
    pub fn set_mode(&self, path: &str, mode: u32) {
        if let Some(node) = self.tree().nodes.get_mut(path) {
            node.mode = mode;
        }
    }

    /// Marks an existing entry as owned by another user, so only its
    /// "other" permission bits apply to this session. `stat` still reports
    /// the full mode.
    pub fn set_foreign_owner(&self, path: &str) {
        if let Some(node) = self.tree().nodes.get_mut(path) {
            node.foreign = true;
        }
    }

    /// Names of the children of a directory, in listing order.
    pub fn children(&self, path: &str) -> Vec<String> {
        match self.tree().nodes.get(path).map(|n| &n.data) {
            Some(NodeData::Dir { children }) => children.clone(),
            _ => Vec::new(),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Common prologue for every request: connection check, accounting and
    /// simulated latency.
    async fn begin(&self, op: &str, path: &str) -> Result<InFlight<'_>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.check_open(op, path)?;
        if !path.starts_with('/') {
            return Err(SftpError::new(ErrorKind::InvalidPath, op, path)
                .with_detail("path must be absolute"));
        }
        Ok(guard)
    }

    fn check_open(&self, op: &str, path: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SftpError::new(ErrorKind::Connection, op, path));
        }
        Ok(())
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

impl TransportSession for MemorySession {
    fn label(&self) -> &str {
        "remote"
    }

    fn cwd(&self) -> SessionFuture<'_, String> {
        Box::pin(async move {
            let _guard = self.begin("cwd", &self.cwd).await?;
            Ok(self.cwd.clone())
        })
    }

    fn stat<'a>(&'a self, path: &'a str) -> SessionFuture<'a, FileStat> {
        Box::pin(async move {
            let _guard = self.begin("stat", path).await?;
            let path = normalize(path);
            self.tree()
                .nodes
                .get(path)
                .map(Node::stat)
                .ok_or_else(|| SftpError::new(ErrorKind::NotFound, "stat", path))
        })
    }

    fn list<'a>(&'a self, path: &'a str) -> SessionFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            let _guard = self.begin("list", path).await?;
            let path = normalize(path);
            let tree = self.tree();
            let node = tree
                .nodes
                .get(path)
                .ok_or_else(|| SftpError::new(ErrorKind::NotFound, "list", path))?;
            let NodeData::Dir { children } = &node.data else {
                return Err(SftpError::new(ErrorKind::NotADirectory, "list", path));
            };
            if !node.readable() {
                return Err(SftpError::new(ErrorKind::Permission, "list", path));
            }
            Ok(children
                .iter()
                .filter_map(|name| {
                    let child = tree.nodes.get(&join(path, name))?;
                    Some(DirEntry {
                        name: name.clone(),
                        kind: child.kind(),
                        size: child.size(),
                    })
                })
                .collect())
        })
    }

    fn writable<'a>(&'a self, path: &'a str) -> SessionFuture<'a, bool> {
        Box::pin(async move {
            let _guard = self.begin("stat", path).await?;
            let path = normalize(path);
            self.tree()
                .nodes
                .get(path)
                .map(Node::writable)
                .ok_or_else(|| SftpError::new(ErrorKind::NotFound, "stat", path))
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.begin("mkdir", path).await?;
            let path = normalize(path);
            let mut tree = self.tree();
            if tree.nodes.contains_key(path) {
                return Err(SftpError::new(ErrorKind::Failure, "mkdir", path)
                    .with_detail("file already exists"));
            }
            tree.check_parent_writable("mkdir", path)?;
            tree.insert(path, Node::dir(DEFAULT_DIR_MODE));
            Ok(())
        })
    }

    fn rmdir<'a>(&'a self, path: &'a str, recursive: bool) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.begin("rmdir", path).await?;
            let path = normalize(path);
            let mut tree = self.tree();
            let node = tree
                .nodes
                .get(path)
                .ok_or_else(|| SftpError::new(ErrorKind::NotFound, "rmdir", path))?;
            let NodeData::Dir { children } = &node.data else {
                return Err(SftpError::new(ErrorKind::NotADirectory, "rmdir", path));
            };
            if !recursive && !children.is_empty() {
                return Err(SftpError::new(ErrorKind::Failure, "rmdir", path)
                    .with_detail("directory not empty"));
            }
            tree.check_parent_writable("rmdir", path)?;
            tree.remove_subtree(path);
            Ok(())
        })
    }

    fn open_read<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ReadStream> {
        Box::pin(async move {
            let _guard = self.begin("open", path).await?;
            let path = normalize(path);
            let tree = self.tree();
            let node = tree
                .nodes
                .get(path)
                .ok_or_else(|| SftpError::new(ErrorKind::NotFound, "open", path))?;
            let NodeData::File { data } = &node.data else {
                return Err(SftpError::new(ErrorKind::NotRegularFile, "open", path));
            };
            if !node.readable() {
                return Err(SftpError::new(ErrorKind::Permission, "open", path));
            }
            Ok(Box::new(MemoryReader {
                data: std::io::Cursor::new(data.clone()),
                closed: Arc::clone(&self.closed),
            }) as ReadStream)
        })
    }

    fn open_write<'a>(&'a self, path: &'a str, mode: WriteMode) -> SessionFuture<'a, WriteSink> {
        Box::pin(async move {
            let _guard = self.begin("open", path).await?;
            let path = normalize(path);
            let mut tree = self.tree();
            match tree.nodes.get_mut(path) {
                Some(node) => {
                    if node.kind() == FileKind::Directory {
                        return Err(SftpError::new(ErrorKind::BadPath, "open", path)
                            .with_detail("is a directory"));
                    }
                    if !node.writable() {
                        return Err(SftpError::new(ErrorKind::Permission, "open", path));
                    }
                    if let (WriteMode::Truncate, NodeData::File { data }) = (mode, &mut node.data) {
                        data.clear();
                    }
                }
                None => {
                    tree.check_parent_writable("open", path)?;
                    tree.insert(path, Node::file(Vec::new()));
                }
            }
            Ok(Box::new(MemoryWriter {
                tree: Arc::clone(&self.tree),
                closed: Arc::clone(&self.closed),
                path: path.to_string(),
            }) as WriteSink)
        })
    }

    fn remove<'a>(&'a self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.begin("delete", path).await?;
            let path = normalize(path);
            let mut tree = self.tree();
            match tree.nodes.get(path).map(Node::kind) {
                None => return Err(SftpError::new(ErrorKind::NotFound, "delete", path)),
                Some(FileKind::Directory) => {
                    return Err(SftpError::new(ErrorKind::Failure, "delete", path)
                        .with_detail("is a directory"));
                }
                Some(_) => {}
            }
            tree.check_parent_writable("delete", path)?;
            tree.remove_subtree(path);
            Ok(())
        })
    }

    fn rename<'a>(&'a self, from: &'a str, to: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.begin("rename", from).await?;
            let (from, to) = (normalize(from), normalize(to));
            let mut tree = self.tree();
            if !tree.nodes.contains_key(from) {
                return Err(SftpError::new(ErrorKind::NotFound, "rename", from));
            }
            if tree.nodes.contains_key(to) {
                return Err(SftpError::new(ErrorKind::Failure, "rename", to)
                    .with_detail("destination exists"));
            }
            tree.check_parent_writable("rename", from)?;
            tree.check_parent_writable("rename", to)?;

            let prefix = format!("{from}/");
            let moved: Vec<String> = tree
                .nodes
                .keys()
                .filter(|k| k.as_str() == from || k.starts_with(&prefix))
                .cloned()
                .collect();
            let mut nodes: Vec<(String, Node)> = moved
                .into_iter()
                .filter_map(|key| {
                    let node = tree.nodes.remove(&key)?;
                    Some((format!("{to}{}", &key[from.len()..]), node))
                })
                .collect();
            tree.remove_subtree(from);
            // Parents before children so child links land in their parent.
            nodes.sort_by_key(|(key, _)| key.len());
            for (key, node) in nodes {
                tree.insert(&key, node);
            }
            Ok(())
        })
    }
}

/// Read stream over a snapshot of a file's contents.
struct MemoryReader {
    data: std::io::Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.closed.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Pin::new(&mut self.data).poll_read(cx, buf)
    }
}

/// Write-through sink into a file node.
struct MemoryWriter {
    tree: Arc<Mutex<Tree>>,
    closed: Arc<AtomicBool>,
    path: String,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        let mut tree = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        match tree.nodes.get_mut(&self.path) {
            Some(Node {
                data: NodeData::File { data },
                ..
            }) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::from(io::ErrorKind::NotFound))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Poll::Ready(Ok(()))
    }
}
