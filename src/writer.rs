//! Archive writer.
//!
//! Emits the header, then every directory table in pre-order, then every
//! directory's file bytes in the same pre-order, exactly as
//! [`LayoutPlan`] assumed.  The writer only needs `Write`; nothing is
//! patched after the fact because all offsets are known up front.

use std::fs::File;
use std::io::{self, Read, Write};
use tracing::trace;

use crate::buffer::BufferPool;
use crate::error::Result;
use crate::header::Header;
use crate::layout::{relative_offsets, LayoutPlan};
use crate::table::{DirEntry, DirTable, FileEntry};
use crate::tree::{DirNode, FileNode};

pub struct ArchiveWriter<'p, W: Write> {
    writer:  W,
    pool:    &'p BufferPool,
    written: u64,
}

impl<'p, W: Write> ArchiveWriter<'p, W> {
    pub fn new(writer: W, pool: &'p BufferPool) -> Self {
        Self { writer, pool, written: 0 }
    }

    /// Write the whole archive.  Returns the number of bytes written.
    pub fn write_archive(mut self, tree: &DirNode, plan: &LayoutPlan) -> Result<u64> {
        let dirs = tree.preorder();

        // ── Header ───────────────────────────────────────────────────────────
        Header::new(plan.data_base).write(&mut self.writer)?;
        self.written += u64::from(crate::header::HEADER_SIZE);

        // ── Tables ───────────────────────────────────────────────────────────
        for (index, dir) in dirs.iter().enumerate() {
            let layout = &plan.dirs[index];
            debug_assert_eq!(self.written, u64::from(layout.table_offset));

            let table = table_for(dir, plan, index);
            table.write(&mut self.writer)?;
            self.written += DirTable::encoded_len(table.subdirs.len(), table.files.len());
        }

        // ── Data ─────────────────────────────────────────────────────────────
        for (index, dir) in dirs.iter().enumerate() {
            debug_assert_eq!(self.written, u64::from(plan.dirs[index].data_offset));
            for file in &dir.files {
                self.copy_file(file)?;
            }
        }

        self.writer.flush()?;
        debug_assert_eq!(self.written, u64::from(plan.data_end));
        Ok(self.written)
    }

    /// Copy exactly `file.size` bytes from the source path.
    fn copy_file(&mut self, file: &FileNode) -> Result<()> {
        let mut src = File::open(&file.path)?.take(u64::from(file.size));
        let mut buf = self.pool.acquire();
        let mut remaining = u64::from(file.size);

        while remaining > 0 {
            let n = src.read(&mut buf)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, format!(
                    "{} shrank while packing: {} bytes missing",
                    file.path.display(), remaining
                )).into());
            }
            self.writer.write_all(&buf[..n])?;
            remaining -= n as u64;
        }

        self.written += u64::from(file.size);
        trace!(path = %file.path.display(), size = file.size, "packed file");
        Ok(())
    }
}

/// Build the on-disk table of the directory at pre-order position `index`.
pub fn table_for(dir: &DirNode, plan: &LayoutPlan, index: usize) -> DirTable {
    let layout = &plan.dirs[index];
    let subdirs = dir.subdirs.iter().zip(&layout.subdirs).map(|(sub, &child)| DirEntry {
        name:         sub.name.clone(),
        table_offset: plan.dirs[child].table_offset,
        data_offset:  plan.dirs[child].data_offset,
    }).collect();
    let files = dir.files.iter().zip(relative_offsets(dir)).map(|(f, at)| FileEntry {
        name:            f.name.clone(),
        relative_offset: at,
        size:            f.size,
    }).collect();
    DirTable { subdirs, files }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{TableEntry, ENTRY_SIZE};
    use std::fs;

    #[test]
    fn test_written_bytes_follow_plan() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d").join("inner"), b"XYZ").unwrap();
        fs::write(dir.path().join("top"), b"hello").unwrap();

        let tree = DirNode::scan(dir.path()).unwrap();
        let plan = LayoutPlan::compute(&tree).unwrap();
        let pool = BufferPool::new(2);

        let mut out: Vec<u8> = Vec::new();
        let n = ArchiveWriter::new(&mut out, &pool).write_archive(&tree, &plan).unwrap();
        assert_eq!(n, out.len() as u64);
        assert_eq!(n, u64::from(plan.data_end));
        assert_eq!(pool.available(), 1);

        assert_eq!(&out[..4], b"PACK");
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), plan.data_base);

        // Root table: 1 subdir, 1 file.
        assert_eq!(&out[8..12], &1u32.to_le_bytes());
        let sub = TableEntry::decode(out[12..12 + ENTRY_SIZE].try_into().unwrap());
        assert_eq!(sub.name, "d");
        assert_eq!(sub.offset, plan.dirs[1].table_offset);
        assert_eq!(sub.info, plan.data_base + 5);

        let base = plan.data_base as usize;
        assert_eq!(&out[base..], b"helloXYZ");
    }

    #[test]
    fn test_source_shrunk_after_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), b"0123456789").unwrap();
        let tree = DirNode::scan(dir.path()).unwrap();
        let plan = LayoutPlan::compute(&tree).unwrap();
        fs::write(dir.path().join("f"), b"012").unwrap();

        let pool = BufferPool::default();
        let err = ArchiveWriter::new(Vec::<u8>::new(), &pool).write_archive(&tree, &plan).unwrap_err();
        match err {
            crate::error::PackError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }
}
