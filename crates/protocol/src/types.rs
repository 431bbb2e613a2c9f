use serde::{Deserialize, Serialize};

/// Kind of a filesystem entry as reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// Devices, sockets, fifos.
    Other,
}

impl FileKind {
    /// Single-character type code, as shown by `ls -l`.
    pub fn type_code(self) -> char {
        match self {
            FileKind::File => '-',
            FileKind::Directory => 'd',
            FileKind::Symlink => 'l',
            FileKind::Other => '?',
        }
    }

    pub fn is_dir(self) -> bool {
        self == FileKind::Directory
    }

    pub fn is_file(self) -> bool {
        self == FileKind::File
    }
}

/// Metadata for a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    /// POSIX permission bits (`0o755` style, no file type bits).
    pub permissions: u32,
}

impl FileStat {
    /// Returns `true` if the owner write bit is set.
    pub fn owner_writable(&self) -> bool {
        self.permissions & 0o200 != 0
    }

    /// Returns `true` if the owner read bit is set.
    pub fn owner_readable(&self) -> bool {
        self.permissions & 0o400 != 0
    }
}

/// A single entry returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
}

/// How a session opens a file for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or truncate.
    Truncate,
    /// Create or append at the end.
    Append,
}
