//! Directory tables and their fixed 40-byte entries.
//!
//! ```text
//! directory table:
//!   u32 LE   subdir_count
//!   subdir_count * 40 B   subdirectory entries
//!   u32 LE   file_count
//!   file_count * 40 B     file entries
//!
//! entry:
//!   32 B     ASCII name, zero padded (at least one terminator byte)
//!   u32 LE   offset
//!   u32 LE   info
//! ```
//!
//! `offset`/`info` are overloaded on disk.  For a subdirectory they hold the
//! absolute table offset and absolute data offset of that directory; for a
//! file they hold the offset relative to the parent's data start and the
//! file size.  [`DirEntry`] and [`FileEntry`] keep the two meanings apart
//! once decoded.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{PackError, Result};

pub const NAME_FIELD_SIZE: usize = 32;
/// One byte of the name field is reserved for the terminator.
pub const MAX_NAME_LEN: usize = NAME_FIELD_SIZE - 1;
pub const ENTRY_SIZE: usize = NAME_FIELD_SIZE + 8;
/// Size of the two count fields framing a directory table.
pub const TABLE_OVERHEAD: usize = 8;

/// Check that `name` can be stored in an entry name field.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PackError::InvalidName { name: name.into(), reason: "name is empty" });
    }
    if !name.is_ascii() {
        return Err(PackError::InvalidName { name: name.into(), reason: "name is not ASCII" });
    }
    if name.bytes().any(|b| b == 0) {
        return Err(PackError::InvalidName { name: name.into(), reason: "name contains a NUL byte" });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(PackError::NameTooLong {
            name: name.into(),
            len:  name.len(),
            max:  MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Raw on-disk entry with the untyped `offset`/`info` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name:   String,
    pub offset: u32,
    pub info:   u32,
}

impl TableEntry {
    pub fn encode(&self) -> Result<[u8; ENTRY_SIZE]> {
        validate_name(&self.name)?;
        let mut out = [0u8; ENTRY_SIZE];
        out[..self.name.len()].copy_from_slice(self.name.as_bytes());
        out[32..36].copy_from_slice(&self.offset.to_le_bytes());
        out[36..40].copy_from_slice(&self.info.to_le_bytes());
        Ok(out)
    }

    /// Decoding never rejects a name: bytes up to the first NUL (or the whole
    /// field) are taken as-is.  Only the writer enforces name validity.
    pub fn decode(bytes: &[u8; ENTRY_SIZE]) -> Self {
        let field = &bytes[..NAME_FIELD_SIZE];
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_SIZE);
        let name = String::from_utf8_lossy(&field[..end]).into_owned();
        let offset = u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        let info = u32::from_le_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
        Self { name, offset, info }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.encode()?)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut buf = [0u8; ENTRY_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self::decode(&buf))
    }
}

/// A subdirectory entry: where its own table and data section live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name:         String,
    pub table_offset: u32,
    pub data_offset:  u32,
}

/// A file entry: position within the parent's data section, and length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name:            String,
    pub relative_offset: u32,
    pub size:            u32,
}

impl From<TableEntry> for DirEntry {
    fn from(e: TableEntry) -> Self {
        DirEntry { name: e.name, table_offset: e.offset, data_offset: e.info }
    }
}

impl From<TableEntry> for FileEntry {
    fn from(e: TableEntry) -> Self {
        FileEntry { name: e.name, relative_offset: e.offset, size: e.info }
    }
}

impl From<&DirEntry> for TableEntry {
    fn from(d: &DirEntry) -> Self {
        TableEntry { name: d.name.clone(), offset: d.table_offset, info: d.data_offset }
    }
}

impl From<&FileEntry> for TableEntry {
    fn from(f: &FileEntry) -> Self {
        TableEntry { name: f.name.clone(), offset: f.relative_offset, info: f.size }
    }
}

/// One directory's complete table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirTable {
    pub subdirs: Vec<DirEntry>,
    pub files:   Vec<FileEntry>,
}

impl DirTable {
    /// On-disk size of a table with the given child counts.
    pub fn encoded_len(subdirs: usize, files: usize) -> u64 {
        TABLE_OVERHEAD as u64 + (subdirs as u64 + files as u64) * ENTRY_SIZE as u64
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.subdirs.len() as u32)?;
        for d in &self.subdirs {
            TableEntry::from(d).write(&mut writer)?;
        }
        writer.write_u32::<LittleEndian>(self.files.len() as u32)?;
        for f in &self.files {
            TableEntry::from(f).write(&mut writer)?;
        }
        Ok(())
    }

    /// Entries are read one at a time; a bogus count fails on end-of-stream
    /// instead of allocating up front.
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let subdir_count = reader.read_u32::<LittleEndian>()?;
        let mut subdirs = Vec::new();
        for _ in 0..subdir_count {
            subdirs.push(TableEntry::read(&mut reader)?.into());
        }
        let file_count = reader.read_u32::<LittleEndian>()?;
        let mut files = Vec::new();
        for _ in 0..file_count {
            files.push(TableEntry::read(&mut reader)?.into());
        }
        Ok(Self { subdirs, files })
    }
}
