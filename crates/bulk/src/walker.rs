//! Source tree enumeration.

use sftpdir_protocol::{ErrorKind, FileKind, Result, SftpError};
use sftpdir_session::TransportSession;
use tracing::{debug, trace};

use crate::path::CanonicalPath;
use crate::types::{Filter, TreeEntry};

/// Walks a directory tree depth-first through a session.
pub struct DirectoryWalker<'a> {
    session: &'a dyn TransportSession,
    filter: Option<&'a Filter>,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(session: &'a dyn TransportSession) -> Self {
        Self {
            session,
            filter: None,
        }
    }

    /// Prunes entries the filter rejects. A rejected directory is neither
    /// emitted nor descended into.
    pub fn with_filter(mut self, filter: Option<&'a Filter>) -> Self {
        self.filter = filter;
        self
    }

    fn accepts(&self, path: &str, is_dir: bool) -> bool {
        self.filter.is_none_or(|f| f(path, is_dir))
    }

    /// Enumerates the tree under `root`.
    ///
    /// The root comes first (with an empty relative path). Each directory
    /// is followed by its files, then by its subdirectories and their
    /// contents, all in the order the session lists them. Any listing
    /// failure aborts the whole walk.
    pub async fn walk(&self, root: &CanonicalPath) -> Result<Vec<TreeEntry>> {
        let stat = self.session.stat(root.as_str()).await?;
        if !stat.kind.is_dir() {
            return Err(SftpError::new(ErrorKind::NotADirectory, "walk", root.as_str()));
        }

        let mut entries = Vec::new();
        // (relative path, absolute path); popped in reverse push order.
        let mut stack = vec![(String::new(), root.clone())];

        while let Some((relative, dir)) = stack.pop() {
            entries.push(TreeEntry {
                relative_path: relative.clone(),
                kind: FileKind::Directory,
                size: 0,
            });

            let listing = self.session.list(dir.as_str()).await?;
            trace!(dir = %dir, count = listing.len(), "listed");

            let mut subdirs = Vec::new();
            for item in listing {
                let child = dir.join(&item.name);
                let child_relative = if relative.is_empty() {
                    item.name.clone()
                } else {
                    format!("{relative}/{}", item.name)
                };
                match item.kind {
                    FileKind::Directory => {
                        if self.accepts(child.as_str(), true) {
                            subdirs.push((child_relative, child));
                        }
                    }
                    FileKind::File => {
                        if self.accepts(child.as_str(), false) {
                            entries.push(TreeEntry {
                                relative_path: child_relative,
                                kind: FileKind::File,
                                size: item.size,
                            });
                        }
                    }
                    kind => debug!(path = %child, ?kind, "skipping special entry"),
                }
            }
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(entries)
    }
}
