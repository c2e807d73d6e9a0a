//! Part header framing.
//!
//! Every part file starts with one text line:
//!
//! ```text
//! <format_version>,<content_digest>,<part_index>,<part_count>\n
//! ```
//!
//! followed immediately by the raw chunk bytes.  The first `\n` is the only
//! delimiter; the payload may contain any byte value, newlines included.

use std::io::{self, Write};
use thiserror::Error;

/// Format version written by this build.
pub const FORMAT_VERSION: &str = "1.0.0";
pub const FIELD_SEPARATOR: u8 = b',';
pub const HEADER_TERMINATOR: u8 = b'\n';
const FIELD_COUNT: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HeaderError {
    #[error("no newline delimiter after the header")]
    MissingDelimiter,
    #[error("header line is not valid UTF-8")]
    NotUtf8,
    #[error("expected {FIELD_COUNT} comma-separated header fields, found {0}")]
    FieldCount(usize),
    #[error("{field} '{value}' is not a base-10 integer")]
    BadInteger { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub format_version: String,
    /// Lowercase hex MD5 of the whole unsplit payload.
    pub content_digest: String,
    /// 1-based position of this part.
    pub part_index:     u64,
    pub part_count:     u64,
}

impl ChunkHeader {
    pub fn new(format_version: &str, content_digest: &str, part_index: u64, part_count: u64) -> Self {
        Self {
            format_version: format_version.to_owned(),
            content_digest: content_digest.to_owned(),
            part_index,
            part_count,
        }
    }

    /// `true` if `version` can be written without breaking the header line.
    pub fn is_valid_version(version: &str) -> bool {
        !version.bytes().any(|b| b == FIELD_SEPARATOR || b == HEADER_TERMINATOR || b == b'\r')
    }

    /// Serialize the header line, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{},{},{},{}\n",
            self.format_version, self.content_digest, self.part_index, self.part_count
        )
        .into_bytes()
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }

    /// Parse a header line (terminator already removed).
    pub fn parse(line: &[u8]) -> Result<Self, HeaderError> {
        let line = std::str::from_utf8(line).map_err(|_| HeaderError::NotUtf8)?;
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR as char).collect();
        if fields.len() != FIELD_COUNT {
            return Err(HeaderError::FieldCount(fields.len()));
        }
        Ok(Self {
            format_version: fields[0].to_owned(),
            content_digest: fields[1].to_owned(),
            part_index:     parse_int("part index", fields[2])?,
            part_count:     parse_int("part count", fields[3])?,
        })
    }
}

fn parse_int(field: &'static str, value: &str) -> Result<u64, HeaderError> {
    value.parse().map_err(|_| HeaderError::BadInteger { field, value: value.to_owned() })
}

/// Split a raw part file into its parsed header and payload.
///
/// The payload is everything after the first newline; `bytes` is consumed so
/// the payload buffer is reused without copying.
pub fn split_part(mut bytes: Vec<u8>) -> Result<(ChunkHeader, Vec<u8>), HeaderError> {
    let end = bytes
        .iter()
        .position(|&b| b == HEADER_TERMINATOR)
        .ok_or(HeaderError::MissingDelimiter)?;
    let payload = bytes.split_off(end + 1);
    bytes.truncate(end);
    Ok((ChunkHeader::parse(&bytes)?, payload))
}
