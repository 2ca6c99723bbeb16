//! Involutive byte transform: every byte `b` becomes `0 - b (mod 256)`.
//!
//! Applying the transform twice restores the input, so "encrypt" and
//! "decrypt" are the same operation.  It is obfuscation, not encryption.
//!
//! # Batching
//! [`negate_in_place`] processes eight bytes per `u64` word.  Per byte,
//! `-b == !b + 1`; the `+ 1` is done on the low seven bits of each lane
//! (which cannot carry out of the lane) and the lane's top bit is folded
//! back in with XOR.  The tail shorter than a word goes through
//! [`negate_byte`].

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::buffer::BufferPool;
use crate::error::Result;

const LOW7:  u64 = 0x7f7f_7f7f_7f7f_7f7f;
const HIGH:  u64 = 0x8080_8080_8080_8080;
const ONES:  u64 = 0x0101_0101_0101_0101;

#[inline]
pub fn negate_byte(b: u8) -> u8 {
    b.wrapping_neg()
}

#[inline]
fn negate_word(word: u64) -> u64 {
    let inv = !word;
    ((inv & LOW7) + ONES) ^ (inv & HIGH)
}

/// Transform `buf` in place.
pub fn negate_in_place(buf: &mut [u8]) {
    let mut words = buf.chunks_exact_mut(8);
    for chunk in &mut words {
        let mut lane = [0u8; 8];
        lane.copy_from_slice(chunk);
        let out = negate_word(u64::from_ne_bytes(lane));
        chunk.copy_from_slice(&out.to_ne_bytes());
    }
    for b in words.into_remainder() {
        *b = negate_byte(*b);
    }
}

/// Stream `src` to `dst` one pooled chunk at a time.  Returns bytes written.
pub fn transform_stream<R: Read, W: Write>(mut src: R, mut dst: W, pool: &BufferPool) -> io::Result<u64> {
    let mut buf = pool.acquire();
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        negate_in_place(&mut buf[..n]);
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
    dst.flush()?;
    Ok(total)
}

/// Transform the file at `src` into `dst`.
///
/// When both name the same file, output goes to a temporary sibling which
/// then atomically replaces the original, keeping its permissions.
pub fn transform_file(src: &Path, dst: &Path, pool: &BufferPool) -> Result<u64> {
    let input = File::open(src)?;

    if same_file(src, dst) {
        let target = dst.canonicalize()?;
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let permissions = input.metadata()?.permissions();
        let mut tmp = NamedTempFile::new_in(parent)?;
        let n = transform_stream(input, tmp.as_file_mut(), pool)?;
        tmp.as_file().set_permissions(permissions)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        debug!(path = %target.display(), bytes = n, "transformed in place");
        return Ok(n);
    }

    let n = transform_stream(input, File::create(dst)?, pool)?;
    debug!(src = %src.display(), dst = %dst.display(), bytes = n, "transformed");
    Ok(n)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
