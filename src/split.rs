use std::num::NonZeroUsize;

use crate::error::{Error, Result};

/// CLI value meaning "write the whole payload as one part".
pub const UNSPLIT_SENTINEL: i64 = -1;

/// How the payload is cut into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkPolicy {
    #[default]
    Unsplit,
    /// Every part except the last holds exactly this many bytes.
    Fixed(NonZeroUsize),
}

impl ChunkPolicy {
    /// Policy from a size in KiB, `-1` meaning no splitting.
    pub fn from_kib(kib: i64) -> Result<Self> {
        if kib == UNSPLIT_SENTINEL {
            return Ok(ChunkPolicy::Unsplit);
        }
        let bytes = kib.checked_mul(1024).ok_or(Error::InvalidChunkSize(kib))?;
        Self::from_bytes(bytes).map_err(|_| Error::InvalidChunkSize(kib))
    }

    /// Policy from a size in bytes, `-1` meaning no splitting.
    pub fn from_bytes(bytes: i64) -> Result<Self> {
        if bytes == UNSPLIT_SENTINEL {
            return Ok(ChunkPolicy::Unsplit);
        }
        usize::try_from(bytes)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(ChunkPolicy::Fixed)
            .ok_or(Error::InvalidChunkSize(bytes))
    }

}

/// Cut `payload` into ordered slices according to `policy`.
///
/// Splitting is positional only.  An empty payload still yields one (empty)
/// slice so every archive has at least one part.
pub fn split(payload: &[u8], policy: ChunkPolicy) -> Vec<&[u8]> {
    match policy {
        ChunkPolicy::Fixed(c) if !payload.is_empty() => payload.chunks(c.get()).collect(),
        _ => vec![payload],
    }
}
