//! High-level [`Archive`] API, the primary embedding surface.
//!
//! ```no_run
//! use ira::archive::{Archive, PackOptions, UnpackOptions};
//! use ira::split::ChunkPolicy;
//!
//! let ar = Archive::new();
//! let opts = PackOptions { chunk_policy: ChunkPolicy::from_kib(100)?, ..Default::default() };
//! ar.pack("photos", "backup/photos", &opts, None)?;
//! ar.unpack("backup/photos", "restored", &UnpackOptions::default(), None)?;
//! # Ok::<(), ira::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::codec::{ContentCodec, ZipDeflate};
use crate::error::{Error, Result};
use crate::header::FORMAT_VERSION;
use crate::index::PartIndex;
use crate::io_stream::{read_parts, FsPartSource, PartSource, PartWriter};
use crate::reassembly::{reassemble_raw, Part};
use crate::split::ChunkPolicy;
use crate::verify::{verify, VerifiedArchive};

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`Archive::pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub chunk_policy:      ChunkPolicy,
    pub format_version:    String,
    /// Deflate level 0-9; `None` for the codec default.
    pub compression_level: Option<i32>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            chunk_policy:      ChunkPolicy::Unsplit,
            format_version:    FORMAT_VERSION.to_owned(),
            compression_level: None,
        }
    }
}

/// Configuration for [`Archive::unpack`].
#[derive(Debug, Clone, Copy)]
pub struct UnpackOptions {
    /// Extract into a sibling staging directory and move into place only
    /// after every entry is written.  When `false`, entries go straight into
    /// the destination and a failure can leave it partially populated.
    pub staged: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self { staged: true }
    }
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Side-channel notifications.  Correctness never depends on a listener.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    PartWritten { index: u64, count: u64, path: &'a Path },
    EntryExtracted { index: usize, total: usize, name: &'a str },
}

pub type ProgressFn<'a> = dyn FnMut(Progress<'_>) + 'a;

fn emit(progress: &mut Option<&mut ProgressFn<'_>>, event: Progress<'_>) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(event);
    }
}

// ── Summaries ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PackSummary {
    pub parts:          Vec<PathBuf>,
    pub content_digest: String,
    pub payload_len:    usize,
}

#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub format_version:  String,
    pub part_count:      u64,
    pub payload_len:     usize,
    pub expected_digest: String,
    pub computed_digest: String,
}

impl From<&VerifiedArchive> for VerifySummary {
    fn from(v: &VerifiedArchive) -> Self {
        VerifySummary {
            format_version:  v.format_version.clone(),
            part_count:      v.part_count,
            payload_len:     v.payload.len(),
            expected_digest: v.expected_digest.clone(),
            computed_digest: v.computed_digest.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnpackSummary {
    pub verified:    VerifySummary,
    pub entries:     usize,
    pub destination: PathBuf,
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// Pack and unpack pipelines over a content codec and a part source.
pub struct Archive<C = ZipDeflate, S = FsPartSource> {
    codec:  C,
    source: S,
}

impl Archive {
    pub fn new() -> Self {
        Self { codec: ZipDeflate::default(), source: FsPartSource }
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ContentCodec, S: PartSource> Archive<C, S> {
    pub fn with_parts(codec: C, source: S) -> Self {
        Self { codec, source }
    }

    // ── Pack ─────────────────────────────────────────────────────────────────

    /// Compress `source`, split it, and write `<output>.ira` or
    /// `<output>_part<N>.ira` files.
    pub fn pack(
        &self,
        source:       impl AsRef<Path>,
        output:       impl AsRef<Path>,
        opts:         &PackOptions,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<PackSummary> {
        let source = source.as_ref();
        let writer = PartWriter::new(output.as_ref(), &opts.format_version)?;

        let payload = self.codec.pack(source, opts.compression_level)?;
        info!(
            source = %source.display(),
            codec = self.codec.name(),
            level = ?opts.compression_level,
            bytes = payload.len(),
            "packed source"
        );

        self.write_payload(&writer, &payload, opts.chunk_policy, &mut progress)
    }

    fn write_payload(
        &self,
        writer:   &PartWriter,
        payload:  &[u8],
        policy:   ChunkPolicy,
        progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> Result<PackSummary> {
        let written = writer.write(payload, policy, |path, index, count| {
            emit(progress, Progress::PartWritten { index, count, path });
        })?;
        info!(parts = written.paths.len(), digest = %written.content_digest, "wrote archive");
        Ok(PackSummary {
            parts:          written.paths,
            content_digest: written.content_digest,
            payload_len:    written.payload_len,
        })
    }

    // ── Unpack ───────────────────────────────────────────────────────────────

    /// Locate, validate and verify the parts of `target`; returns the payload.
    pub fn load_verified(&self, target: impl AsRef<Path>) -> Result<VerifiedArchive> {
        let raw = read_parts(&self.source, target.as_ref())?;
        verify(reassemble_raw(raw)?)
    }

    /// Reassemble and verify without extracting anything.
    pub fn verify(&self, target: impl AsRef<Path>) -> Result<VerifySummary> {
        Ok(VerifySummary::from(&self.load_verified(target)?))
    }

    /// Reassemble, verify, then expand into `dest`.  Nothing is written
    /// under `dest` unless every part check and the digest check pass.
    pub fn unpack(
        &self,
        target:       impl AsRef<Path>,
        dest:         impl AsRef<Path>,
        opts:         &UnpackOptions,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<UnpackSummary> {
        let dest = dest.as_ref();
        let verified = self.load_verified(target)?;

        let mut on_entry = |index: usize, total: usize, name: &str| {
            emit(&mut progress, Progress::EntryExtracted { index, total, name });
        };
        let entries = if opts.staged {
            self.extract_staged(&verified.payload, dest, &mut on_entry)?
        } else {
            self.codec.unpack(&verified.payload, dest, &mut on_entry)?
        };
        info!(entries, dest = %dest.display(), "unpacked archive");

        Ok(UnpackSummary {
            verified:    VerifySummary::from(&verified),
            entries,
            destination: dest.to_owned(),
        })
    }

    fn extract_staged(
        &self,
        payload:  &[u8],
        dest:     &Path,
        on_entry: &mut dyn FnMut(usize, usize, &str),
    ) -> Result<usize> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(Error::io_at(&parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".ira-staging-")
            .tempdir_in(&parent)
            .map_err(Error::io_at(&parent))?;

        let entries = self.codec.unpack(payload, staging.path(), on_entry)?;
        commit_staged(staging.path(), dest)?;
        Ok(entries)
    }

    // ── Inspect ──────────────────────────────────────────────────────────────

    /// List every part found for `target` without validating the set.
    /// Fails only when nothing is found or a file has no parseable header.
    pub fn inspect(&self, target: impl AsRef<Path>) -> Result<PartIndex> {
        let raw = read_parts(&self.source, target.as_ref())?;
        let parts = raw.into_iter().map(Part::parse).collect::<Result<Vec<_>>>()?;
        Ok(PartIndex::from_parts(&parts))
    }
}

/// Move a fully extracted staging tree to `dest`.
///
/// An absent destination is a single rename.  An existing one receives the
/// staged entries one by one, replacing files of the same name.
fn commit_staged(staged: &Path, dest: &Path) -> Result<()> {
    if !dest.exists() {
        return fs::rename(staged, dest).map_err(Error::io_at(dest));
    }
    warn!(dest = %dest.display(), "destination exists, merging extracted entries");

    let entries: Vec<walkdir::DirEntry> = WalkDir::new(staged)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Io { path: staged.to_owned(), source: e.into() })?;

    for entry in entries {
        let rel = entry.path().strip_prefix(staged).unwrap_or(entry.path());
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(Error::io_at(&target))?;
        } else {
            fs::rename(entry.path(), &target).map_err(Error::io_at(&target))?;
        }
    }
    Ok(())
}
