//! Error taxonomy shared by every pack, extract and transform operation.
//!
//! Every variant aborts the whole command; nothing is retried or downgraded
//! to a warning.  [`PackError::exit_code`] gives each kind its own process
//! exit status so scripts can tell a corrupt archive from a refused path.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for dirpack operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Which 32-bit quantity of the format would overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limit {
    /// The header plus all directory tables.
    TableRegion,
    /// The data section end offset.
    DataRegion,
    /// A single source file larger than `u32::MAX` bytes.
    File { path: PathBuf },
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::TableRegion    => write!(f, "table region"),
            Limit::DataRegion     => write!(f, "data region"),
            Limit::File { path }  => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Error, Debug)]
pub enum PackError {
    /// Bad magic, corrupt header or unreadable table structure.
    #[error("Invalid archive format: {0}")]
    Format(String),

    #[error("Invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Entry name {name:?} is {len} bytes long (max {max})")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Format limit exceeded: {0} does not fit in 32 bits")]
    FormatLimit(Limit),

    #[error("Refusing to extract outside the destination: {}", .path.display())]
    PathEscape { path: PathBuf },

    #[error("Archive truncated while extracting {}: expected {expected} bytes, got {copied}", .path.display())]
    Truncated { path: PathBuf, expected: u64, copied: u64 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PackError {
    /// Process exit status for this error kind.  Status 2 is left to clap
    /// for usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackError::Io(_)               => 1,
            PackError::Format(_)           => 3,
            PackError::InvalidName { .. }  => 4,
            PackError::NameTooLong { .. }  => 5,
            PackError::FormatLimit(_)      => 6,
            PackError::PathEscape { .. }   => 7,
            PackError::Truncated { .. }    => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            PackError::Io(io::Error::new(io::ErrorKind::Other, "x")),
            PackError::Format("bad magic".into()),
            PackError::InvalidName { name: String::new(), reason: "empty" },
            PackError::NameTooLong { name: "a".repeat(32), len: 32, max: 31 },
            PackError::FormatLimit(Limit::DataRegion),
            PackError::PathEscape { path: PathBuf::from("../x") },
            PackError::Truncated { path: PathBuf::from("x"), expected: 4, copied: 1 },
        ];
        let mut codes: Vec<i32> = errors.iter().map(PackError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&2));
    }

    #[test]
    fn test_limit_display_names_the_cause() {
        let e = PackError::FormatLimit(Limit::File { path: PathBuf::from("big.bin") });
        assert!(e.to_string().contains("big.bin"));
        assert!(PackError::FormatLimit(Limit::TableRegion).to_string().contains("table region"));
    }
}
