//! Two-pass offset assignment over a sorted [`DirNode`] tree.
//!
//! Pass 1 walks the tree in pre-order from [`HEADER_SIZE`], giving each
//! directory its table offset; the final cursor is the data-section base.
//! Pass 2 walks the same order from that base, giving each directory its
//! data offset.  A directory's own files are contiguous; its subdirectories'
//! data follows in sorted order.
//!
//! Both passes are pure.  All arithmetic is done in `u64` and checked
//! against `u32::MAX`, so an oversized archive is refused before the
//! destination file is opened.

use tracing::debug;

use crate::error::{Limit, PackError, Result};
use crate::header::HEADER_SIZE;
use crate::table::DirTable;
use crate::tree::DirNode;

/// Offsets assigned to one directory.  Indexed by pre-order position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirLayout {
    pub table_offset: u32,
    pub data_offset:  u32,
    /// Pre-order indices of this directory's subdirectories, in sorted order.
    pub subdirs:      Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    /// First byte after the last table; stored in the header.
    pub data_base: u32,
    /// One past the last data byte; the archive's total length.
    pub data_end:  u32,
    /// Entry `i` belongs to `tree.preorder()[i]`.
    pub dirs:      Vec<DirLayout>,
}

impl LayoutPlan {
    pub fn compute(tree: &DirNode) -> Result<Self> {
        let (mut dirs, data_base) = table_pass(tree)?;
        let data_end = data_pass(tree, &mut dirs, data_base)?;
        debug!(dirs = dirs.len(), data_base, data_end, "layout computed");
        Ok(Self { data_base, data_end, dirs })
    }

    pub fn root(&self) -> &DirLayout {
        &self.dirs[0]
    }
}

fn fits(value: u64, limit: Limit) -> Result<u32> {
    u32::try_from(value).map_err(|_| PackError::FormatLimit(limit))
}

/// Pass 1: table offsets.  Returns the per-directory layouts (data offsets
/// still zero) and the data-section base.
pub fn table_pass(tree: &DirNode) -> Result<(Vec<DirLayout>, u32)> {
    let mut dirs = Vec::new();
    let end = assign_tables(tree, u64::from(HEADER_SIZE), &mut dirs)?;
    Ok((dirs, fits(end, Limit::TableRegion)?))
}

fn assign_tables(dir: &DirNode, cursor: u64, dirs: &mut Vec<DirLayout>) -> Result<u64> {
    let index = dirs.len();
    dirs.push(DirLayout {
        table_offset: fits(cursor, Limit::TableRegion)?,
        ..DirLayout::default()
    });

    let mut cursor = cursor + DirTable::encoded_len(dir.subdirs.len(), dir.files.len());
    fits(cursor, Limit::TableRegion)?;

    for sub in &dir.subdirs {
        let child = dirs.len();
        dirs[index].subdirs.push(child);
        cursor = assign_tables(sub, cursor, dirs)?;
    }
    Ok(cursor)
}

/// Pass 2: data offsets.  Fills `data_offset` for every directory and returns
/// the end of the data section.
pub fn data_pass(tree: &DirNode, dirs: &mut [DirLayout], data_base: u32) -> Result<u32> {
    let end = assign_data(tree, 0, u64::from(data_base), dirs)?;
    fits(end, Limit::DataRegion)
}

fn assign_data(dir: &DirNode, index: usize, cursor: u64, dirs: &mut [DirLayout]) -> Result<u64> {
    dirs[index].data_offset = fits(cursor, Limit::DataRegion)?;

    let own: u64 = dir.files.iter().map(|f| u64::from(f.size)).sum();
    let mut cursor = cursor + own;
    fits(cursor, Limit::DataRegion)?;

    for (k, sub) in dir.subdirs.iter().enumerate() {
        let child = dirs[index].subdirs[k];
        cursor = assign_data(sub, child, cursor, dirs)?;
    }
    Ok(cursor)
}

/// Offsets of each file relative to its directory's data start.
/// Only meaningful for a tree that passed [`LayoutPlan::compute`], which
/// bounds every running sum by `u32::MAX`.
pub fn relative_offsets(dir: &DirNode) -> Vec<u32> {
    let mut running = 0u64;
    dir.files.iter().map(|f| {
        let at = running as u32;
        running += u64::from(f.size);
        at
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ENTRY_SIZE;
    use crate::tree::FileNode;
    use std::path::PathBuf;

    fn file(name: &str, size: u32) -> FileNode {
        FileNode { name: name.into(), path: PathBuf::from(name), size }
    }

    fn dir(name: &str, subdirs: Vec<DirNode>, files: Vec<FileNode>) -> DirNode {
        DirNode::new(name, name, subdirs, files)
    }

    #[test]
    fn test_empty_root() {
        let plan = LayoutPlan::compute(&dir("", vec![], vec![])).unwrap();
        assert_eq!(plan.root().table_offset, 8);
        assert_eq!(plan.data_base, 16);
        assert_eq!(plan.data_end, 16);
    }

    #[test]
    fn test_nested_offsets() {
        // root: files r1(10) r2(5); subdirs a{ a1(3), sub aa{ aa1(7) } }, b{ }
        let tree = dir("", vec![
            dir("b", vec![], vec![]),
            dir("a", vec![dir("aa", vec![], vec![file("aa1", 7)])], vec![file("a1", 3)]),
        ], vec![file("r2", 5), file("r1", 10)]);

        let plan = LayoutPlan::compute(&tree).unwrap();
        let e = ENTRY_SIZE as u32;

        // Pre-order: root, a, aa, b.
        let root_len = 8 + 4 * e;
        let a_len = 8 + 2 * e;
        let aa_len = 8 + e;
        let b_len = 8;
        assert_eq!(plan.dirs[0].table_offset, 8);
        assert_eq!(plan.dirs[1].table_offset, 8 + root_len);
        assert_eq!(plan.dirs[2].table_offset, 8 + root_len + a_len);
        assert_eq!(plan.dirs[3].table_offset, 8 + root_len + a_len + aa_len);

        let base = 8 + root_len + a_len + aa_len + b_len;
        assert_eq!(plan.data_base, base);
        assert_eq!(plan.dirs[0].data_offset, base);
        assert_eq!(plan.dirs[1].data_offset, base + 15);
        assert_eq!(plan.dirs[2].data_offset, base + 18);
        assert_eq!(plan.dirs[3].data_offset, base + 25);
        assert_eq!(plan.data_end, base + 25);

        assert_eq!(plan.dirs[0].subdirs, vec![1, 3]);
        assert_eq!(plan.dirs[1].subdirs, vec![2]);
        assert_eq!(relative_offsets(&tree), vec![0, 10]);
    }

    #[test]
    fn test_plan_matches_preorder() {
        let tree = dir("", vec![
            dir("x", vec![dir("y", vec![], vec![])], vec![]),
            dir("w", vec![], vec![]),
        ], vec![]);
        let plan = LayoutPlan::compute(&tree).unwrap();
        assert_eq!(plan.dirs.len(), tree.preorder().len());
        let offsets: Vec<u32> = plan.dirs.iter().map(|d| d.table_offset).collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_data_region_overflow() {
        let tree = dir("", vec![], vec![file("a", u32::MAX), file("b", 1)]);
        assert!(matches!(
            LayoutPlan::compute(&tree),
            Err(PackError::FormatLimit(Limit::DataRegion))
        ));
    }

    #[test]
    fn test_data_region_overflow_across_directories() {
        let tree = dir("", vec![
            dir("a", vec![], vec![file("big", u32::MAX / 2)]),
            dir("b", vec![], vec![file("big", u32::MAX / 2)]),
        ], vec![file("c", 1024)]);
        assert!(matches!(
            LayoutPlan::compute(&tree),
            Err(PackError::FormatLimit(Limit::DataRegion))
        ));
    }

    #[test]
    fn test_data_exactly_at_limit() {
        let tree = dir("", vec![], vec![file("a", u32::MAX - 56)]);
        let plan = LayoutPlan::compute(&tree).unwrap();
        assert_eq!(plan.data_base, 8 + 8 + ENTRY_SIZE as u32);
        assert_eq!(plan.data_end, u32::MAX);
    }

    #[test]
    fn test_limit_check() {
        assert_eq!(fits(u64::from(u32::MAX), Limit::TableRegion).unwrap(), u32::MAX);
        assert!(matches!(
            fits(u64::from(u32::MAX) + 1, Limit::TableRegion),
            Err(PackError::FormatLimit(Limit::TableRegion))
        ));
    }
}
