//! Crate-wide error type.
//!
//! Every unpack-side variant names the part file (or the archive target) and
//! the check that failed.  None of them are retryable: a missing or corrupt
//! part does not fix itself.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::header::HeaderError;

pub type Result<T> = std::result::Result<T, Error>;

/// Header field compared across the parts of one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    FormatVersion,
    ContentDigest,
    PartCount,
}

impl std::fmt::Display for HeaderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HeaderField::FormatVersion => "format version",
            HeaderField::ContentDigest => "content digest",
            HeaderField::PartCount     => "part count",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("No part files found for {}", .target.display())]
    NotFound { target: PathBuf },

    #[error("{}: malformed part: {source}", .file.display())]
    Format {
        file:   PathBuf,
        #[source]
        source: HeaderError,
    },

    #[error("{}: part index {index} is outside 1..={count}", .file.display())]
    Range { file: PathBuf, index: u64, count: u64 },

    #[error("{}: part index {index} already seen in another file", .file.display())]
    Duplicate { file: PathBuf, index: u64 },

    #[error("{}: {field} mismatch, expected '{expected}' but found '{found}'", .file.display())]
    InconsistentHeader {
        file:     PathBuf,
        field:    HeaderField,
        expected: String,
        found:    String,
    },

    #[error("Missing parts {missing:?}: expected {expected} part(s), found {found}")]
    MissingParts { missing: Vec<u64>, expected: u64, found: usize },

    #[error("Integrity check failed: expected digest {expected}, computed {computed}")]
    Integrity { expected: String, computed: String },

    #[error("Invalid chunk size {0}: use -1 for no splitting or a positive size")]
    InvalidChunkSize(i64),

    #[error("Invalid format version '{0}': must not contain ',' or a newline")]
    InvalidVersion(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid part file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("{}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Adapter for `map_err` that attaches the path an I/O call operated on.
    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
