//! Content codec: source tree ⇄ one compressed byte stream.
//!
//! The container never looks inside the stream.  [`ContentCodec`] is the
//! seam; [`ZipDeflate`] is the built-in implementation (zip archive, deflate
//! entries), which is what every `.ira` written so far contains.
//!
//! # Entry names
//! A directory source stores each regular file under its path relative to
//! the root, `/`-separated.  A file source stores the file under its base
//! name.  On expansion, entry names that would land outside the destination
//! (absolute paths, `..`) are rejected before anything is written for them.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Source {} does not exist or cannot be read: {source}", .path.display())]
    Source {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Zip stream error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Entry '{0}' would extract outside the destination")]
    UnsafeEntry(String),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> CodecError + '_ {
    move |source| CodecError::Io { path: path.to_owned(), source }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait ContentCodec: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Build the compressed stream for a file or directory.  `level`
    /// overrides the codec's own setting when given.
    fn pack(&self, source: &Path, level: Option<i32>) -> Result<Vec<u8>, CodecError>;

    /// Expand `data` under `dest`, calling `on_entry(index, total, name)`
    /// after each entry (1-based index).  Returns the number of entries.
    fn unpack(
        &self,
        data:     &[u8],
        dest:     &Path,
        on_entry: &mut dyn FnMut(usize, usize, &str),
    ) -> Result<usize, CodecError>;
}

// ── Zip / deflate ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipDeflate {
    /// Deflate level 0-9; `None` uses the codec default.
    pub level: Option<i32>,
}

impl ZipDeflate {
    pub fn with_level(level: Option<i32>) -> Self {
        Self { level }
    }

    fn options(level: Option<i32>, size: u64) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(level)
            .large_file(size >= ZIP64_THRESHOLD)
    }

    fn add_file<W: Write + io::Seek>(
        zip:      &mut ZipWriter<W>,
        level:    Option<i32>,
        path:     &Path,
        arc_name: String,
    ) -> Result<(), CodecError> {
        let data = fs::read(path).map_err(io_at(path))?;
        debug!(entry = %arc_name, bytes = data.len(), "adding entry");
        zip.start_file(arc_name, Self::options(level, data.len() as u64))?;
        zip.write_all(&data).map_err(io_at(path))?;
        Ok(())
    }
}

/// `/`-joined archive name of `path` relative to `root`.
fn archive_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl ContentCodec for ZipDeflate {
    fn name(&self) -> &'static str { "zip-deflate" }

    fn pack(&self, source: &Path, level: Option<i32>) -> Result<Vec<u8>, CodecError> {
        let level = level.or(self.level);
        let meta = fs::metadata(source).map_err(|e| CodecError::Source {
            path:   source.to_owned(),
            source: e,
        })?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        if meta.is_dir() {
            for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = archive_name(source, entry.path());
                Self::add_file(&mut zip, level, entry.path(), name)?;
            }
        } else {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| CodecError::Source {
                    path:   source.to_owned(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
                })?;
            Self::add_file(&mut zip, level, source, name)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    fn unpack(
        &self,
        data:     &[u8],
        dest:     &Path,
        on_entry: &mut dyn FnMut(usize, usize, &str),
    ) -> Result<usize, CodecError> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let total = archive.len();
        fs::create_dir_all(dest).map_err(io_at(dest))?;

        for i in 0..total {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_owned();
            let rel = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| CodecError::UnsafeEntry(name.clone()))?;
            let out = dest.join(&rel);

            if entry.is_dir() {
                fs::create_dir_all(&out).map_err(io_at(&out))?;
            } else {
                if let Some(parent) = out.parent() {
                    fs::create_dir_all(parent).map_err(io_at(parent))?;
                }
                let mut file = File::create(&out).map_err(io_at(&out))?;
                io::copy(&mut entry, &mut file).map_err(io_at(&out))?;
            }
            debug!(entry = %name, index = i + 1, total, "extracted entry");
            on_entry(i + 1, total, &name);
        }
        Ok(total)
    }
}
