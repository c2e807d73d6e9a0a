//! Part listing for diagnostics (`ira info`).
//!
//! Unlike reassembly, building a [`PartIndex`] never fails on an incomplete
//! or inconsistent set.  It records what is on disk so the user can see why
//! an unpack would fail.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::reassembly::{missing_indices, validate, Part};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub file:           PathBuf,
    pub format_version: String,
    pub content_digest: String,
    pub part_index:     u64,
    pub part_count:     u64,
    pub payload_size:   u64,
}

impl From<&Part> for PartRecord {
    fn from(p: &Part) -> Self {
        PartRecord {
            file:           p.source.clone(),
            format_version: p.header.format_version.clone(),
            content_digest: p.header.content_digest.clone(),
            part_index:     p.header.part_index,
            part_count:     p.header.part_count,
            payload_size:   p.payload.len() as u64,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PartIndex {
    /// Records sorted by part index, then file name.
    pub records:      Vec<PartRecord>,
    /// Indices absent from `1..=part_count` of the first part found.
    pub missing:      Vec<u64>,
    pub payload_size: u64,
    /// `None` when every header check passes; otherwise the first failure.
    pub problem:      Option<String>,
}

impl PartIndex {
    pub fn from_parts(parts: &[Part]) -> Self {
        let mut records: Vec<PartRecord> = parts.iter().map(PartRecord::from).collect();
        records.sort_by(|a, b| (a.part_index, &a.file).cmp(&(b.part_index, &b.file)));
        PartIndex {
            payload_size: records.iter().map(|r| r.payload_size).sum(),
            missing:      missing_indices(parts),
            problem:      validate(parts).err().map(|e| e.to_string()),
            records,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.problem.is_none()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
