//! Directory tree fixtures described in JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use sftpdir_session::MemorySession;

/// A tree of directories, each holding a number of generated files.
#[derive(Debug, Deserialize)]
pub struct TreeFixture {
    pub name: String,
    pub directories: Vec<DirSpec>,
}

#[derive(Debug, Deserialize)]
pub struct DirSpec {
    /// Path below the tree root; empty for the root.
    pub path: String,
    pub files: usize,
    pub prefix: String,
}

/// Returns the path to the fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Loads a tree fixture by file name.
pub fn load(name: &str) -> anyhow::Result<TreeFixture> {
    let path = fixtures_dir().join(name);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse fixture {}", path.display()))
}

fn contents(relative: &str, index: usize) -> Vec<u8> {
    format!("{relative}\n").repeat(index % 7 + 1).into_bytes()
}

impl TreeFixture {
    /// Every generated file as `(relative path, contents)`.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        for dir in &self.directories {
            for i in 1..=dir.files {
                let name = format!("{}{i}.txt", dir.prefix);
                let relative = if dir.path.is_empty() {
                    name
                } else {
                    format!("{}/{name}", dir.path)
                };
                let data = contents(&relative, i);
                out.push((relative, data));
            }
        }
        out
    }

    pub fn file_count(&self) -> usize {
        self.directories.iter().map(|d| d.files).sum()
    }

    /// Directories including the root.
    pub fn dir_count(&self) -> usize {
        self.directories.len()
    }

    /// Builds the tree under `root` on an in-memory remote.
    pub fn populate_remote(&self, session: &MemorySession, root: &str) {
        for dir in &self.directories {
            session.create_dir_all(&join(root, &dir.path));
        }
        for (relative, data) in self.files() {
            session.write(&join(root, &relative), data);
        }
    }

    /// Builds the tree under `root` on the local filesystem.
    pub fn populate_local(&self, root: &Path) -> anyhow::Result<()> {
        for dir in &self.directories {
            std::fs::create_dir_all(root.join(&dir.path))?;
        }
        for (relative, data) in self.files() {
            std::fs::write(root.join(&relative), data)?;
        }
        Ok(())
    }
}

fn join(root: &str, relative: &str) -> String {
    if relative.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{relative}")
    }
}
