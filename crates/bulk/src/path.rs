//! Path resolution.
//!
//! User paths may be absolute or relative (`.`, `..`, bare names). They are
//! resolved against the working directory of their namespace and
//! normalized, so the rest of the crate only ever sees absolute paths with
//! no `.` or `..` segments.

use std::fmt;

use sftpdir_protocol::{ErrorKind, Result, SftpError};

/// Which filesystem a path belongs to. Paths are never compared across
/// namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Local,
    Remote,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Local => f.write_str("local"),
            Namespace::Remote => f.write_str("remote"),
        }
    }
}

/// An absolute, normalized path within one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPath {
    namespace: Namespace,
    path: String,
}

impl CanonicalPath {
    /// The root directory of `namespace`.
    pub fn root(namespace: Namespace) -> Self {
        Self {
            namespace,
            path: "/".to_string(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Appends a `/`-separated relative path. An empty `relative` returns
    /// the path unchanged.
    pub fn join(&self, relative: &str) -> Self {
        if relative.is_empty() {
            return self.clone();
        }
        Self {
            namespace: self.namespace,
            path: normalize(&format!("{}/{relative}", self.path)),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind('/')?;
        let parent = if idx == 0 { "/" } else { &self.path[..idx] };
        Some(Self {
            namespace: self.namespace,
            path: parent.to_string(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.path.rsplit('/').next()
    }

    /// Ancestors from the first segment down to (and including) `self`.
    /// The root itself is not included.
    pub fn prefixes(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = String::new();
        for segment in self.path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            out.push(Self {
                namespace: self.namespace,
                path: current.clone(),
            });
        }
        out
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

/// Collapses `.`, `..` and repeated separators in an absolute path.
///
/// `..` at the root stays at the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn check_structure(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(
            SftpError::new(ErrorKind::InvalidPath, "resolve", raw).with_detail("empty path"),
        );
    }
    if raw.contains('\0') {
        let shown = raw.replace('\0', "\\0");
        return Err(SftpError::new(ErrorKind::InvalidPath, "resolve", shown)
            .with_detail("embedded null byte"));
    }
    Ok(())
}

/// Resolves raw paths of one namespace against its working directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    cwd: CanonicalPath,
}

impl PathResolver {
    /// Creates a resolver. `cwd` must itself be absolute.
    pub fn new(namespace: Namespace, cwd: &str) -> Result<Self> {
        check_structure(cwd)?;
        if !cwd.starts_with('/') {
            return Err(SftpError::new(ErrorKind::InvalidPath, "resolve", cwd)
                .with_detail("working directory must be absolute"));
        }
        Ok(Self {
            cwd: CanonicalPath {
                namespace,
                path: normalize(cwd),
            },
        })
    }

    pub fn namespace(&self) -> Namespace {
        self.cwd.namespace
    }

    pub fn cwd(&self) -> &CanonicalPath {
        &self.cwd
    }

    /// Resolves `raw` to a canonical path.
    ///
    /// Fails only for structurally malformed input. Whether the result
    /// exists is for the transport to say.
    pub fn resolve(&self, raw: &str) -> Result<CanonicalPath> {
        check_structure(raw)?;
        let path = if raw.starts_with('/') {
            normalize(raw)
        } else {
            normalize(&format!("{}/{raw}", self.cwd.path))
        };
        Ok(CanonicalPath {
            namespace: self.cwd.namespace,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(cwd: &str) -> PathResolver {
        PathResolver::new(Namespace::Remote, cwd).unwrap()
    }

    #[test]
    fn absolute_paths_are_normalized() {
        let r = remote("/home/tim");
        assert_eq!(r.resolve("/a/./b//c/").unwrap().as_str(), "/a/b/c");
        assert_eq!(r.resolve("/a/b/../c").unwrap().as_str(), "/a/c");
        assert_eq!(r.resolve("/").unwrap().as_str(), "/");
    }

    #[test]
    fn relative_paths_use_cwd() {
        let r = remote("/home/tim/testServer");
        assert_eq!(r.resolve("./get.txt").unwrap().as_str(), "/home/tim/testServer/get.txt");
        assert_eq!(r.resolve("get.txt").unwrap().as_str(), "/home/tim/testServer/get.txt");
        assert_eq!(
            r.resolve("../testServer/get.txt").unwrap().as_str(),
            "/home/tim/testServer/get.txt"
        );
        assert_eq!(r.resolve(".").unwrap().as_str(), "/home/tim/testServer");
    }

    #[test]
    fn escaping_the_root_is_clamped() {
        let r = remote("/a");
        assert_eq!(r.resolve("../../../../x").unwrap().as_str(), "/x");
        assert_eq!(r.resolve("/../..").unwrap().as_str(), "/");
    }

    #[test]
    fn malformed_input_is_invalid_path() {
        let r = remote("/");
        assert!(r.resolve("").unwrap_err().is(ErrorKind::InvalidPath));
        assert!(r.resolve("a\0b").unwrap_err().is(ErrorKind::InvalidPath));
        assert!(PathResolver::new(Namespace::Local, "relative").is_err());
    }

    #[test]
    fn namespace_is_carried() {
        let local = PathResolver::new(Namespace::Local, "/tmp").unwrap();
        let p = local.resolve("x").unwrap();
        assert_eq!(p.namespace(), Namespace::Local);
        assert_ne!(p, remote("/tmp").resolve("x").unwrap());
    }

    #[test]
    fn join_parent_and_prefixes() {
        let base = remote("/").resolve("/srv/bulk").unwrap();
        let child = base.join("subdir-1/file.txt");
        assert_eq!(child.as_str(), "/srv/bulk/subdir-1/file.txt");
        assert_eq!(child.file_name(), Some("file.txt"));
        assert_eq!(child.parent().unwrap().as_str(), "/srv/bulk/subdir-1");
        assert_eq!(base.join(""), base);
        assert_eq!(CanonicalPath::root(Namespace::Remote).parent(), None);

        let prefixes: Vec<String> = child.prefixes().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            prefixes,
            vec!["/srv", "/srv/bulk", "/srv/bulk/subdir-1", "/srv/bulk/subdir-1/file.txt"]
        );
    }
}
