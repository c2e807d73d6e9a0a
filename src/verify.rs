use tracing::info;

use crate::digest::digest;
use crate::error::{Error, Result};
use crate::reassembly::ReassembledArchive;

/// Payload whose digest matched the header digest.
#[derive(Debug, Clone)]
pub struct VerifiedArchive {
    pub format_version:  String,
    pub part_count:      u64,
    pub expected_digest: String,
    pub computed_digest: String,
    pub payload:         Vec<u8>,
}

/// Recompute the payload digest and compare it with the one every header
/// carries.  Comparison is exact, case included.  On mismatch the payload
/// is dropped with the error.
pub fn verify(archive: ReassembledArchive) -> Result<VerifiedArchive> {
    let computed = digest(&archive.payload);
    info!(computed = %computed, expected = %archive.content_digest, "verifying payload digest");
    if computed != archive.content_digest {
        return Err(Error::Integrity { expected: archive.content_digest, computed });
    }
    Ok(VerifiedArchive {
        format_version:  archive.format_version,
        part_count:      archive.part_count,
        expected_digest: archive.content_digest,
        computed_digest: computed,
        payload:         archive.payload,
    })
}
