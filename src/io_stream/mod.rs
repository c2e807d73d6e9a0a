//! Part file I/O: writer, discovery and loading.
//!
//! # Naming
//! A single-part archive is `<base>.ira`.  A multi-part archive is
//! `<base>_part1.ira` … `<base>_part<N>.ira`.  Names are deterministic from
//! the base, so two packs with the same base must not run concurrently.
//!
//! # Discovery
//! [`PartSource::locate`] turns whatever the caller typed (a base name, a
//! single-part file, or any one part of a set) into the full candidate list:
//! an existing single-part file wins; otherwise `<base>_part*.ira` is
//! globbed.  Headers, not file names, decide a part's position, so the order
//! returned here never affects the reassembled stream.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::digest::digest;
use crate::error::{Error, Result};
use crate::header::ChunkHeader;
use crate::perf::load_all;
use crate::split::{split, ChunkPolicy};

pub const PART_EXTENSION: &str = "ira";
pub const PART_MARKER:    &str = "_part";

// ── Naming ───────────────────────────────────────────────────────────────────

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// File name of part `index` out of `count` for `base`.
pub fn part_path(base: &Path, index: u64, count: u64) -> PathBuf {
    if count == 1 {
        with_suffix(base, &format!(".{PART_EXTENSION}"))
    } else {
        with_suffix(base, &format!("{PART_MARKER}{index}.{PART_EXTENSION}"))
    }
}

fn file_name_str(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// File name with `.ira` removed, and the byte offset of a trailing
/// `_part<digits>` marker if there is one.
fn split_name(path: &Path) -> (String, Option<usize>) {
    let mut name = file_name_str(path);
    let ext = format!(".{PART_EXTENSION}");
    if name.ends_with(&ext) {
        name.truncate(name.len() - ext.len());
    }
    let marker = name.rfind(PART_MARKER).filter(|&pos| {
        let digits = &name[pos + PART_MARKER.len()..];
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    });
    (name, marker)
}

fn has_part_marker(path: &Path) -> bool {
    split_name(path).1.is_some()
}

/// The `<N>` of a `<base>_part<N>.ira` name.
fn marker_index(path: &Path) -> Option<u64> {
    let (name, marker) = split_name(path);
    marker.and_then(|pos| name[pos + PART_MARKER.len()..].parse().ok())
}

/// Archive base for a user-supplied target: strips `.ira`, then a trailing
/// `_part<digits>`.
pub fn base_of(target: &Path) -> PathBuf {
    let (mut name, marker) = split_name(target);
    if let Some(pos) = marker {
        name.truncate(pos);
    }
    target.with_file_name(name)
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Result of writing one archive's parts.
#[derive(Debug, Clone)]
pub struct WrittenParts {
    pub paths:          Vec<PathBuf>,
    pub content_digest: String,
    pub payload_len:    usize,
}

pub struct PartWriter {
    base:               PathBuf,
    pub format_version: String,
}

impl PartWriter {
    pub fn new(base: impl Into<PathBuf>, format_version: &str) -> Result<Self> {
        if !ChunkHeader::is_valid_version(format_version) {
            return Err(Error::InvalidVersion(format_version.to_owned()));
        }
        Ok(Self { base: base.into(), format_version: format_version.to_owned() })
    }

    /// Split `payload`, frame each slice and write it as one part file.
    ///
    /// The digest covers the whole unsplit payload and is shared by every
    /// header.  `on_part(path, index, count)` runs after each file is closed.
    pub fn write(
        &self,
        payload:     &[u8],
        policy:      ChunkPolicy,
        mut on_part: impl FnMut(&Path, u64, u64),
    ) -> Result<WrittenParts> {
        let content_digest = digest(payload);
        let slices = split(payload, policy);
        let count = slices.len() as u64;

        if let Some(dir) = self.base.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(Error::io_at(dir))?;
        }
        self.warn_stale(count);

        let mut paths = Vec::with_capacity(slices.len());
        for (i, slice) in slices.into_iter().enumerate() {
            let index = i as u64 + 1;
            let path = part_path(&self.base, index, count);
            let header = ChunkHeader::new(&self.format_version, &content_digest, index, count);
            write_part(&path, &header, slice).map_err(Error::io_at(&path))?;
            debug!(part = %path.display(), index, count, bytes = slice.len(), "wrote part");
            on_part(&path, index, count);
            paths.push(path);
        }

        Ok(WrittenParts { paths, content_digest, payload_len: payload.len() })
    }

    /// Parts left over from an earlier pack with the same base would be
    /// picked up by discovery and fail the consistency check on unpack.
    fn warn_stale(&self, count: u64) {
        let single = part_path(&self.base, 1, 1);
        if count > 1 && single.is_file() {
            warn!(stale = %single.display(), "single-part file with the same base exists");
        }
        let Ok(existing) = glob_parts(&self.base) else { return };
        for path in existing {
            let stale = count == 1
                || marker_index(&path).map_or(true, |i| i == 0 || i > count);
            if stale {
                warn!(stale = %path.display(), "part file from an earlier pack will not be overwritten");
            }
        }
    }
}

fn write_part(path: &Path, header: &ChunkHeader, slice: &[u8]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    header.write(&mut out)?;
    out.write_all(slice)?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()
}

// ── Discovery / loading ──────────────────────────────────────────────────────

/// Raw contents of one candidate part file.
#[derive(Debug, Clone)]
pub struct RawPart {
    pub path:  PathBuf,
    pub bytes: Vec<u8>,
}

/// Lists and loads the candidate part files of one archive.
pub trait PartSource: Sync {
    /// Candidate part files for `target`, or [`Error::NotFound`].
    fn locate(&self, target: &Path) -> Result<Vec<PathBuf>>;

    /// Full contents of one candidate.
    fn load(&self, part: &Path) -> io::Result<Vec<u8>>;
}

/// Filesystem-backed [`PartSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPartSource;

fn glob_parts(base: &Path) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    let pattern = format!("{escaped}{PART_MARKER}*.{PART_EXTENSION}");
    let mut found: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "skipping unreadable part candidate");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    found.sort();
    Ok(found)
}

impl PartSource for FsPartSource {
    fn locate(&self, target: &Path) -> Result<Vec<PathBuf>> {
        let marked = has_part_marker(target);
        let is_single_name = !marked
            && target.extension().is_some_and(|e| e == PART_EXTENSION);
        if is_single_name && target.is_file() {
            return Ok(vec![target.to_owned()]);
        }

        let base = base_of(target);
        if !marked {
            let single = part_path(&base, 1, 1);
            if single.is_file() {
                return Ok(vec![single]);
            }
        }

        let found = glob_parts(&base)?;
        if found.is_empty() {
            return Err(Error::NotFound { target: target.to_owned() });
        }
        Ok(found)
    }

    fn load(&self, part: &Path) -> io::Result<Vec<u8>> {
        fs::read(part)
    }
}

/// Locate and load every candidate part of `target`.
pub fn read_parts<S: PartSource + ?Sized>(source: &S, target: &Path) -> Result<Vec<RawPart>> {
    let paths = source.locate(target)?;
    debug!(target = %target.display(), candidates = paths.len(), "located part files");
    load_all(source, paths)
}
