//! In-memory directory tree built by scanning the source directory.
//!
//! Names are validated and children are sorted by byte value here, once,
//! before any offset is computed.  Layout and writer both walk the tree in
//! the order produced by [`DirNode::preorder`].

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Limit, PackError, Result};
use crate::table::validate_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirNode {
    pub name:    String,
    pub path:    PathBuf,
    pub subdirs: Vec<DirNode>,
    pub files:   Vec<FileNode>,
}

impl DirNode {
    /// Build a tree from in-memory children, sorting them ordinally.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>,
               mut subdirs: Vec<DirNode>, mut files: Vec<FileNode>) -> Self {
        subdirs.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        files.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        Self { name: name.into(), path: path.into(), subdirs, files }
    }

    /// Recursively scan `root`.  The root's own name is never stored in the
    /// archive and is not validated.
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let name = root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::scan_dir(name, root.to_path_buf())
    }

    fn scan_dir(name: String, path: PathBuf) -> Result<Self> {
        let mut subdirs = Vec::new();
        let mut files = Vec::new();

        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let child_path = entry.path();
            let child_name = entry_name(&entry)?;
            validate_name(&child_name)?;

            // Follows symlinks; a link is archived as what it points at.
            let meta = fs::metadata(&child_path)?;
            if meta.is_dir() {
                subdirs.push(Self::scan_dir(child_name, child_path)?);
            } else if meta.is_file() {
                let size = u32::try_from(meta.len())
                    .map_err(|_| PackError::FormatLimit(Limit::File { path: child_path.clone() }))?;
                files.push(FileNode { name: child_name, path: child_path, size });
            } else {
                warn!(path = %child_path.display(), "skipping entry that is neither file nor directory");
            }
        }

        Ok(Self::new(name, path, subdirs, files))
    }

    /// Directories in canonical pre-order: a directory, then each subdirectory
    /// subtree in sorted order.
    pub fn preorder(&self) -> Vec<&DirNode> {
        let mut out = Vec::new();
        self.collect_preorder(&mut out);
        out
    }

    fn collect_preorder<'a>(&'a self, out: &mut Vec<&'a DirNode>) {
        out.push(self);
        for sub in &self.subdirs {
            sub.collect_preorder(out);
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.subdirs.iter().map(DirNode::file_count).sum::<usize>()
    }
}

fn entry_name(entry: &fs::DirEntry) -> Result<String> {
    let raw = entry.file_name();
    raw.into_string().map_err(|raw| PackError::InvalidName {
        name:   raw.to_string_lossy().into_owned(),
        reason: "name is not ASCII",
    })
}
