//! Fixed 8-byte archive header.
//!
//! ```text
//! offset 0  4 bytes  magic "PACK"
//! offset 4  4 bytes  u32 LE data-section base offset
//! ```
//!
//! The root directory table starts immediately after the header at
//! [`HEADER_SIZE`].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{PackError, Result};

pub const MAGIC: &[u8; 4] = b"PACK";
pub const HEADER_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Absolute offset of the first byte after the last directory table.
    pub data_base: u32,
}

impl Header {
    pub fn new(data_base: u32) -> Self {
        Self { data_base }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.data_base)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(short_header)?;
        if &magic != MAGIC {
            return Err(PackError::Format(format!(
                "bad magic {magic:02x?}, expected {MAGIC:02x?}"
            )));
        }
        let data_base = reader.read_u32::<LittleEndian>().map_err(short_header)?;
        if data_base < HEADER_SIZE {
            return Err(PackError::Format(format!(
                "data-section base {data_base} lies inside the header"
            )));
        }
        Ok(Self { data_base })
    }
}

fn short_header(e: io::Error) -> PackError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PackError::Format("archive is shorter than its header".into())
    } else {
        PackError::Io(e)
    }
}
