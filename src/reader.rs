//! Archive reader and extractor.
//!
//! # Table walk
//! [`ArchiveReader::walk`] follows subdirectory entries recursively from the
//! root table at [`HEADER_SIZE`], producing a flat list of file records with
//! absolute archive offsets (`directory data offset + entry offset`).  The
//! walk trusts nothing: a table that ends early, a table offset seen twice,
//! or nesting deeper than [`MAX_DEPTH`] is a format error.
//!
//! # Extraction
//! [`ArchiveReader::extract_to`] resolves every destination against the
//! canonical extraction root *before* writing anything, so a single escaping
//! name aborts the call with zero files written.  Files are then copied in
//! ascending offset order, seeking only when the stream is not already at
//! the next record.

use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use crate::buffer::BufferPool;
use crate::error::{PackError, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::table::DirTable;

/// Deepest directory nesting the reader will follow.
pub const MAX_DEPTH: usize = 1024;

/// One file found by the table walk.  `path` is relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path:   PathBuf,
    pub offset: u64,
    pub size:   u32,
}

/// Everything the table walk found.  `files` is sorted by `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub dirs:  Vec<PathBuf>,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub dirs:  usize,
    pub files: usize,
    pub bytes: u64,
}

pub struct ArchiveReader<R: Read + Seek> {
    reader:   R,
    header:   Header,
    /// Current stream position, tracked to skip redundant seeks.
    position: u64,
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut reader)?;
        Ok(Self { reader, header, position: u64::from(HEADER_SIZE) })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        if self.position != offset {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        Ok(())
    }

    // ── Table walk ───────────────────────────────────────────────────────────

    pub fn walk(&mut self) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut visited = HashSet::new();
        self.walk_dir(HEADER_SIZE, self.header.data_base, Path::new(""), 0,
                      &mut visited, &mut listing)?;
        listing.files.sort_by_key(|r| r.offset);
        debug!(dirs = listing.dirs.len(), files = listing.files.len(), "table walk complete");
        Ok(listing)
    }

    fn walk_dir(
        &mut self,
        table_offset: u32,
        data_offset:  u32,
        prefix:       &Path,
        depth:        usize,
        visited:      &mut HashSet<u32>,
        listing:      &mut Listing,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(PackError::Format(format!(
                "directories nested deeper than {MAX_DEPTH} levels"
            )));
        }
        if !visited.insert(table_offset) {
            return Err(PackError::Format(format!(
                "directory table at offset {table_offset} is referenced twice"
            )));
        }

        self.seek_to(u64::from(table_offset))?;
        let table = DirTable::read(&mut self.reader).map_err(|e| {
            // Position is unknown after a failed read.
            self.position = u64::MAX;
            table_error(e, table_offset)
        })?;
        self.position = u64::from(table_offset)
            + DirTable::encoded_len(table.subdirs.len(), table.files.len());

        for f in &table.files {
            listing.files.push(FileRecord {
                path:   prefix.join(&f.name),
                offset: u64::from(data_offset) + u64::from(f.relative_offset),
                size:   f.size,
            });
        }
        for d in &table.subdirs {
            let path = prefix.join(&d.name);
            listing.dirs.push(path.clone());
            self.walk_dir(d.table_offset, d.data_offset, &path, depth + 1, visited, listing)?;
        }
        Ok(())
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    /// Extract everything under `dest`, creating it if necessary.
    ///
    /// Nothing is created, not even `dest`, unless every destination passes
    /// [`resolve_under`] and [`check_existing`].
    pub fn extract_to<P: AsRef<Path>>(&mut self, dest: P, pool: &BufferPool) -> Result<ExtractSummary> {
        let listing = self.walk()?;
        let root = canonical_root(dest.as_ref())?;

        // Every destination is checked before the first write.
        let dirs = listing.dirs.iter()
            .map(|d| resolve_under(&root, d))
            .collect::<Result<Vec<_>>>()?;
        let targets = listing.files.iter()
            .map(|f| resolve_under(&root, &f.path).map(|p| (p, f)))
            .collect::<Result<Vec<_>>>()?;
        for (dir, name) in dirs.iter().zip(&listing.dirs) {
            check_existing(&root, dir, name)?;
        }
        for (path, record) in &targets {
            check_existing(&root, path, &record.path)?;
        }

        fs::create_dir_all(&root)?;
        for dir in &dirs {
            fs::create_dir_all(dir)?;
        }

        let mut summary = ExtractSummary { dirs: dirs.len(), ..ExtractSummary::default() };
        for (path, record) in targets {
            self.copy_out(record, &path, pool)?;
            summary.files += 1;
            summary.bytes += u64::from(record.size);
        }
        Ok(summary)
    }

    fn copy_out(&mut self, record: &FileRecord, dest: &Path, pool: &BufferPool) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        self.seek_to(record.offset)?;

        let mut out = File::create(dest)?;
        let mut buf = pool.acquire();
        let expected = u64::from(record.size);
        let mut copied = 0u64;

        while copied < expected {
            let want = (expected - copied).min(buf.len() as u64) as usize;
            let n = match self.reader.read(&mut buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Err(PackError::Truncated { path: dest.to_path_buf(), expected, copied });
            }
            out.write_all(&buf[..n])?;
            copied += n as u64;
            self.position += n as u64;
        }

        trace!(path = %dest.display(), size = record.size, "extracted file");
        Ok(())
    }
}

fn table_error(e: io::Error, table_offset: u32) -> PackError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PackError::Format(format!("directory table at offset {table_offset} is truncated"))
    } else {
        PackError::Io(e)
    }
}

/// Resolve `relative` lexically under `root`.
///
/// Parent-directory segments may only climb back out of directories the
/// path itself entered.  Absolute components, and paths that resolve to
/// `root` itself, are refused.
pub fn resolve_under(root: &Path, relative: &Path) -> Result<PathBuf> {
    let escape = || PackError::PathEscape { path: relative.to_path_buf() };
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(escape());
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if depth == 0 {
        return Err(escape());
    }
    Ok(resolved)
}

/// Canonical form of `dest`, which need not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended to it.
fn canonical_root(dest: &Path) -> Result<PathBuf> {
    let mut existing = dest;
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut root) => {
                root.extend(tail.iter().rev());
                return Ok(root);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Err(e.into());
                };
                tail.push(name);
                existing = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Refuse `path` if any already-existing component between `root` and
/// `path` is a link that leads outside `root`.
///
/// Catches links planted in the destination (`out/link -> ../elsewhere`),
/// which [`resolve_under`] cannot see.  A dangling link counts as an escape.
pub fn check_existing(root: &Path, path: &Path, name: &Path) -> Result<()> {
    for ancestor in path.ancestors() {
        if ancestor == root || !ancestor.starts_with(root) {
            break;
        }
        match fs::symlink_metadata(ancestor) {
            Ok(_) => {
                let inside = ancestor.canonicalize()
                    .map(|real| real.starts_with(root))
                    .unwrap_or(false);
                if !inside {
                    return Err(PackError::PathEscape { path: name.to_path_buf() });
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{DirEntry, FileEntry};
    use std::io::Cursor;

    fn root() -> PathBuf {
        PathBuf::from("/tmp/out")
    }

    #[test]
    fn test_resolve_plain_paths() {
        assert_eq!(resolve_under(&root(), Path::new("a/b.txt")).unwrap(),
                   PathBuf::from("/tmp/out/a/b.txt"));
        assert_eq!(resolve_under(&root(), Path::new("a/../b.txt")).unwrap(),
                   PathBuf::from("/tmp/out/b.txt"));
    }

    #[test]
    fn test_resolve_refuses_escapes() {
        for bad in ["../x", "a/../../x", "/etc/passwd", "", ".", "a/.."] {
            assert!(
                matches!(resolve_under(&root(), Path::new(bad)), Err(PackError::PathEscape { .. })),
                "{bad:?} should be refused"
            );
        }
    }

    /// Hand-assemble an archive whose root holds one subdirectory pointing
    /// back at the root table.
    #[test]
    fn test_canonical_root_of_missing_dest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let dest = dir.path().join("a").join("b");
        assert_eq!(canonical_root(&dest).unwrap(), base.join("a").join("b"));
        assert!(!dir.path().join("a").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_check_existing_links() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let root = base.join("out");
        fs::create_dir_all(root.join("real")).unwrap();
        fs::create_dir_all(base.join("elsewhere")).unwrap();
        std::os::unix::fs::symlink("../elsewhere", root.join("away")).unwrap();
        std::os::unix::fs::symlink("real", root.join("alias")).unwrap();
        std::os::unix::fs::symlink("missing", root.join("dangling")).unwrap();

        assert!(check_existing(&root, &root.join("real/new.txt"), Path::new("real/new.txt")).is_ok());
        assert!(check_existing(&root, &root.join("alias/new.txt"), Path::new("alias/new.txt")).is_ok());
        for bad in ["away/new.txt", "away", "dangling"] {
            let err = check_existing(&root, &root.join(bad), Path::new(bad)).unwrap_err();
            assert!(matches!(err, PackError::PathEscape { .. }), "{bad} was accepted");
        }
    }

    #[test]
    fn test_cyclic_table_is_rejected() {
        let mut buf = Vec::new();
        Header::new(56).write(&mut buf).unwrap();
        DirTable {
            subdirs: vec![DirEntry { name: "loop".into(), table_offset: 8, data_offset: 56 }],
            files:   vec![],
        }.write(&mut buf).unwrap();

        let mut reader = ArchiveReader::new(Cursor::new(buf)).unwrap();
        assert!(matches!(reader.walk(), Err(PackError::Format(_))));
    }

    #[test]
    fn test_truncated_table_is_format_error() {
        let mut buf = Vec::new();
        Header::new(100).write(&mut buf).unwrap();
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&5u32.to_le_bytes());

        let mut reader = ArchiveReader::new(Cursor::new(buf)).unwrap();
        assert!(matches!(reader.walk(), Err(PackError::Format(_))));
    }

    #[test]
    fn test_walk_sorts_by_offset() {
        let mut buf = Vec::new();
        Header::new(8 + 8 + 2 * 40).write(&mut buf).unwrap();
        DirTable {
            subdirs: vec![],
            files:   vec![
                FileEntry { name: "late".into(),  relative_offset: 4, size: 2 },
                FileEntry { name: "early".into(), relative_offset: 0, size: 4 },
            ],
        }.write(&mut buf).unwrap();
        buf.extend_from_slice(b"abcdef");

        let mut reader = ArchiveReader::new(Cursor::new(buf)).unwrap();
        let listing = reader.walk().unwrap();
        let names: Vec<_> = listing.files.iter().map(|f| f.path.to_string_lossy().into_owned()).collect();
        assert_eq!(names, ["early", "late"]);
        assert_eq!(listing.files[0].offset, 96);
        assert_eq!(listing.files[1].offset, 100);
    }
}
