//! High-level API, the primary embedding surface.
//!
//! ```no_run
//! use dirpack::archive::{pack, extract, PackOptions, ExtractOptions};
//!
//! pack("assets", "assets.pack", &PackOptions::default())?;
//! extract("assets.pack", "restored", &ExtractOptions::default())?;
//! # Ok::<(), dirpack::PackError>(())
//! ```

use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::buffer::{BufferPool, DEFAULT_CHUNK_SIZE};
use crate::error::Result;
use crate::layout::LayoutPlan;
use crate::reader::{ArchiveReader, ExtractSummary, Listing};
use crate::transform::transform_file;
use crate::tree::DirNode;
use crate::writer::ArchiveWriter;

pub const ARCHIVE_EXTENSION:  &str = "pack";
pub const ENCRYPTED_EXTENSION: &str = "enc";

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub chunk_size: usize,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

/// Configuration for [`extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub chunk_size: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

// ── ArchiveInfo ───────────────────────────────────────────────────────────────

/// Summary returned by [`info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    pub data_base:   u32,
    /// Directories below the root.
    pub directories: usize,
    pub files:       usize,
    pub data_bytes:  u64,
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Pack the directory `src` into the archive `dst`.
///
/// Names and format limits are checked before `dst` is created.  An I/O
/// failure during the write phase leaves a partial `dst` behind.
pub fn pack<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, opts: &PackOptions) -> Result<u64> {
    let tree = DirNode::scan(src.as_ref())?;
    let plan = LayoutPlan::compute(&tree)?;

    let pool = BufferPool::new(opts.chunk_size);
    let out = BufWriter::with_capacity(pool.chunk_size(), File::create(dst.as_ref())?);
    let written = ArchiveWriter::new(out, &pool).write_archive(&tree, &plan)?;

    info!(
        src = %src.as_ref().display(), dst = %dst.as_ref().display(),
        files = tree.file_count(), bytes = written, "packed"
    );
    Ok(written)
}

/// Extract the archive `src` into the directory `dst`.
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, opts: &ExtractOptions) -> Result<ExtractSummary> {
    let pool = BufferPool::new(opts.chunk_size);
    let mut reader = ArchiveReader::new(File::open(src.as_ref())?)?;
    let summary = reader.extract_to(dst.as_ref(), &pool)?;

    info!(
        src = %src.as_ref().display(), dst = %dst.as_ref().display(),
        files = summary.files, bytes = summary.bytes, "extracted"
    );
    Ok(summary)
}

/// Walk the archive's tables without extracting anything.
pub fn list<P: AsRef<Path>>(src: P) -> Result<Listing> {
    ArchiveReader::new(File::open(src.as_ref())?)?.walk()
}

pub fn info<P: AsRef<Path>>(src: P) -> Result<ArchiveInfo> {
    let mut reader = ArchiveReader::new(File::open(src.as_ref())?)?;
    let listing = reader.walk()?;
    Ok(ArchiveInfo {
        data_base:   reader.header().data_base,
        directories: listing.dirs.len(),
        files:       listing.files.len(),
        data_bytes:  listing.files.iter().map(|f| u64::from(f.size)).sum(),
    })
}

/// Obfuscate `src` into `dst`.  Same operation as [`decrypt`].
pub fn encrypt<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, chunk_size: usize) -> Result<u64> {
    transform_file(src.as_ref(), dst.as_ref(), &BufferPool::new(chunk_size))
}

/// Restore `src` into `dst`.  Same operation as [`encrypt`].
pub fn decrypt<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q, chunk_size: usize) -> Result<u64> {
    transform_file(src.as_ref(), dst.as_ref(), &BufferPool::new(chunk_size))
}

// ── Default output paths ──────────────────────────────────────────────────────

/// `DIR` -> `DIR.pack`
pub fn default_pack_output(input: &Path) -> PathBuf {
    with_suffix(input, ARCHIVE_EXTENSION)
}

/// `X.pack` -> `X`; without an extension, `X.out`.
pub fn default_extract_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(_) => input.with_extension(""),
        None    => with_suffix(input, "out"),
    }
}

/// `F` -> `F.enc`
pub fn default_encrypt_output(input: &Path) -> PathBuf {
    with_suffix(input, ENCRYPTED_EXTENSION)
}

/// `F.enc` -> `F`; otherwise `F.dec`.
pub fn default_decrypt_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == ENCRYPTED_EXTENSION => input.with_extension(""),
        _ => with_suffix(input, "dec"),
    }
}

/// Append `.suffix` to the final component, keeping any existing extension
/// and ignoring a trailing separator.
fn with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = match input.file_name() {
        Some(n) => n.to_owned(),
        None    => OsString::from("archive"),
    };
    name.push(".");
    name.push(suffix);
    let mut out = input.to_path_buf();
    if input.file_name().is_some() {
        out.set_file_name(name);
    } else {
        out.push(name);
    }
    out
}
