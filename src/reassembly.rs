//! Part validation and reassembly.
//!
//! Parts are checked in the order they were discovered and the first
//! violation stops processing:
//!
//! 1. range: `1 <= part_index <= part_count`
//! 2. duplicate: no index appears twice
//! 3. consistency: version, digest and count match the first part seen
//! 4. completeness: the index set is exactly `1..=part_count`
//!
//! Only once every check has passed are the payloads sorted by index and
//! concatenated.  Discovery order never reaches the output.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Error, HeaderField, Result};
use crate::header::{split_part, ChunkHeader};
use crate::io_stream::RawPart;

/// At most this many missing indices are listed in an error; the expected
/// and found counts are always exact.
pub const MAX_LISTED_MISSING: usize = 1024;

/// One parsed part file.
#[derive(Debug, Clone)]
pub struct Part {
    pub source:  PathBuf,
    pub header:  ChunkHeader,
    pub payload: Vec<u8>,
}

impl Part {
    pub fn parse(raw: RawPart) -> Result<Self> {
        let RawPart { path, bytes } = raw;
        match split_part(bytes) {
            Ok((header, payload)) => Ok(Part { source: path, header, payload }),
            Err(source) => Err(Error::Format { file: path, source }),
        }
    }
}

/// Ordered concatenation of every part's payload.
#[derive(Debug, Clone)]
pub struct ReassembledArchive {
    pub format_version: String,
    pub content_digest: String,
    pub part_count:     u64,
    pub payload:        Vec<u8>,
}

fn check_field(part: &Part, field: HeaderField, expected: &str, found: &str) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(Error::InconsistentHeader {
        file:     part.source.clone(),
        field,
        expected: expected.to_owned(),
        found:    found.to_owned(),
    })
}

/// Run the full validation suite over `parts`.
///
/// `parts` must be non-empty; an empty set has no reference header and is
/// reported as missing part 1.
pub fn validate(parts: &[Part]) -> Result<()> {
    let Some(first) = parts.first() else {
        return Err(Error::MissingParts { missing: vec![1], expected: 1, found: 0 });
    };
    let reference = &first.header;
    let mut seen: BTreeSet<u64> = BTreeSet::new();

    for part in parts {
        let h = &part.header;
        if h.part_index < 1 || h.part_index > h.part_count {
            return Err(Error::Range {
                file:  part.source.clone(),
                index: h.part_index,
                count: h.part_count,
            });
        }
        if !seen.insert(h.part_index) {
            return Err(Error::Duplicate { file: part.source.clone(), index: h.part_index });
        }
        check_field(part, HeaderField::FormatVersion, &reference.format_version, &h.format_version)?;
        check_field(part, HeaderField::ContentDigest, &reference.content_digest, &h.content_digest)?;
        check_field(
            part,
            HeaderField::PartCount,
            &reference.part_count.to_string(),
            &h.part_count.to_string(),
        )?;
    }

    let expected = reference.part_count;
    if seen.len() as u64 != expected {
        let missing = (1..=expected)
            .filter(|i| !seen.contains(i))
            .take(MAX_LISTED_MISSING)
            .collect();
        return Err(Error::MissingParts { missing, expected, found: seen.len() });
    }
    Ok(())
}

/// Compute the indices absent from `parts` without failing; used by
/// diagnostics that must tolerate incomplete sets.
pub fn missing_indices(parts: &[Part]) -> Vec<u64> {
    let Some(count) = parts.first().map(|p| p.header.part_count) else {
        return Vec::new();
    };
    let seen: BTreeSet<u64> = parts.iter().map(|p| p.header.part_index).collect();
    (1..=count).filter(|i| !seen.contains(i)).take(MAX_LISTED_MISSING).collect()
}

/// Validate, order and concatenate.
pub fn reassemble(mut parts: Vec<Part>) -> Result<ReassembledArchive> {
    validate(&parts)?;

    parts.sort_by_key(|p| p.header.part_index);
    let total: usize = parts.iter().map(|p| p.payload.len()).sum();
    let mut payload = Vec::with_capacity(total);
    for part in &parts {
        payload.extend_from_slice(&part.payload);
    }

    let first = &parts[0].header;
    debug!(parts = parts.len(), bytes = payload.len(), "reassembled payload");
    Ok(ReassembledArchive {
        format_version: first.format_version.clone(),
        content_digest: first.content_digest.clone(),
        part_count:     first.part_count,
        payload,
    })
}

/// Parse raw files and reassemble them.  A format error in any file aborts
/// before validation starts.
pub fn reassemble_raw(raw: Vec<RawPart>) -> Result<ReassembledArchive> {
    let parts = raw.into_iter().map(Part::parse).collect::<Result<Vec<_>>>()?;
    reassemble(parts)
}
