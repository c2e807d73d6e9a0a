use ira::archive::{Archive, PackOptions, Progress, UnpackOptions};
use ira::codec::{CodecError, ZipDeflate};
use ira::io_stream::{FsPartSource, PartWriter};
use ira::split::ChunkPolicy;
use ira::{Error, HeaderField, FORMAT_VERSION};
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

fn ten_files() -> Vec<(String, Vec<u8>)> {
    (0..10)
        .map(|i| {
            let name = if i % 3 == 0 { format!("nested/dir_{i}/file_{i}.txt") } else { format!("file_{i}.bin") };
            let data = (0..(i * 997 + 13)).map(|b| (b * 31 + i) as u8).collect();
            (name, data)
        })
        .collect()
}

fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

fn kib(n: i64) -> PackOptions {
    PackOptions { chunk_policy: ChunkPolicy::from_kib(n).unwrap(), ..Default::default() }
}

#[test]
fn test_unsplit_directory_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let files = ten_files();
    let refs: Vec<(&str, &[u8])> = files.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
    write_tree(&src, &refs);

    let ar = Archive::new();
    let base = tmp.path().join("backup");
    let summary = ar.pack(&src, &base, &kib(-1), None).unwrap();

    assert_eq!(summary.parts, vec![tmp.path().join("backup.ira")]);
    let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".ira"))
        .collect();
    assert_eq!(leftovers, vec!["backup.ira".to_string()]);

    let dest = tmp.path().join("restored");
    let out = ar.unpack(&base, &dest, &UnpackOptions::default(), None).unwrap();
    assert_eq!(out.entries, 10);
    assert_eq!(out.verified.computed_digest, out.verified.expected_digest);
    assert_eq!(out.verified.expected_digest, summary.content_digest);

    for (name, data) in &files {
        assert_eq!(&fs::read(dest.join(name)).unwrap(), data, "{name}");
    }
}

#[test]
fn test_single_file_source_uses_base_name() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.txt");
    fs::write(&file, b"single file payload").unwrap();

    let ar = Archive::new();
    let base = tmp.path().join("out/notes");
    ar.pack(&file, &base, &PackOptions::default(), None).unwrap();

    let dest = tmp.path().join("x");
    // Unpack by the full single-part file name.
    ar.unpack(tmp.path().join("out/notes.ira"), &dest, &UnpackOptions::default(), None).unwrap();
    assert_eq!(fs::read(dest.join("notes.txt")).unwrap(), b"single file payload");
}

#[test]
fn test_split_directory_roundtrip_from_any_part() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let big = pseudo_random(50 * 1024, 7);
    write_tree(&src, &[("a/big.bin", &big), ("b.txt", b"hello")]);

    let ar = Archive::new();
    let base = tmp.path().join("arc");
    let summary = ar.pack(&src, &base, &kib(8), None).unwrap();
    assert!(summary.parts.len() > 1);
    for (i, p) in summary.parts.iter().enumerate() {
        assert_eq!(p, &tmp.path().join(format!("arc_part{}.ira", i + 1)));
    }

    // Unpacking via the second part still discovers the whole set.
    let dest = tmp.path().join("restored");
    ar.unpack(&summary.parts[1], &dest, &UnpackOptions::default(), None).unwrap();
    assert_eq!(fs::read(dest.join("a/big.bin")).unwrap(), big);
    assert_eq!(fs::read(dest.join("b.txt")).unwrap(), b"hello");
}

#[test]
fn test_300k_payload_three_parts() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("blob");
    let payload = pseudo_random(300 * 1024, 42);

    let writer = PartWriter::new(&base, FORMAT_VERSION).unwrap();
    let written = writer.write(&payload, ChunkPolicy::from_kib(100).unwrap(), |_, _, _| {}).unwrap();
    assert_eq!(written.paths.len(), 3);

    for (i, path) in written.paths.iter().enumerate() {
        assert_eq!(path, &tmp.path().join(format!("blob_part{}.ira", i + 1)));
        let bytes = fs::read(path).unwrap();
        let header = format!("{},{},{},3\n", FORMAT_VERSION, written.content_digest, i + 1);
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(bytes.len() - header.len(), 100 * 1024);
    }

    let verified = Archive::new().load_verified(&base).unwrap();
    assert_eq!(verified.payload, payload);
    assert_eq!(verified.part_count, 3);
}

#[test]
fn test_progress_reports_parts_and_entries() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write_tree(&src, &[("one", &pseudo_random(6000, 1)), ("two", &pseudo_random(6000, 2))]);

    let ar = Archive::new();
    let base = tmp.path().join("p");
    let mut parts = Vec::new();
    let mut record = |e: Progress<'_>| {
        if let Progress::PartWritten { index, count, .. } = e {
            parts.push((index, count));
        }
    };
    let summary = ar.pack(&src, &base, &kib(4), Some(&mut record)).unwrap();
    let n = summary.parts.len() as u64;
    assert_eq!(parts, (1..=n).map(|i| (i, n)).collect::<Vec<_>>());

    let mut entries = Vec::new();
    let mut record = |e: Progress<'_>| {
        if let Progress::EntryExtracted { index, total, name } = e {
            entries.push((index, total, name.to_owned()));
        }
    };
    ar.unpack(&base, tmp.path().join("d"), &UnpackOptions::default(), Some(&mut record)).unwrap();
    assert_eq!(entries, vec![(1, 2, "one".to_string()), (2, 2, "two".to_string())]);
}

#[test]
fn test_missing_part_is_named() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("m");
    let writer = PartWriter::new(&base, FORMAT_VERSION).unwrap();
    let written = writer.write(&pseudo_random(5000, 3), ChunkPolicy::from_bytes(1000).unwrap(), |_, _, _| {}).unwrap();
    fs::remove_file(&written.paths[2]).unwrap();

    match Archive::new().verify(&base) {
        Err(Error::MissingParts { missing, expected, found }) => {
            assert_eq!(missing, vec![3]);
            assert_eq!(expected, 5);
            assert_eq!(found, 4);
        }
        other => panic!("expected MissingParts, got {other:?}"),
    }
}

#[test]
fn test_duplicate_part_index() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("d");
    let writer = PartWriter::new(&base, FORMAT_VERSION).unwrap();
    let written = writer.write(&pseudo_random(3000, 4), ChunkPolicy::from_bytes(1000).unwrap(), |_, _, _| {}).unwrap();
    // A copy of part 1 under a name the glob also picks up.
    fs::copy(&written.paths[0], tmp.path().join("d_part9.ira")).unwrap();

    let err = Archive::new().verify(&base).unwrap_err();
    assert!(matches!(err, Error::Duplicate { index: 1, .. }), "{err:?}");
}

#[test]
fn test_corrupted_payload_fails_integrity_and_extracts_nothing() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write_tree(&src, &[("f", &pseudo_random(4096, 5))]);

    let ar = Archive::new();
    let base = tmp.path().join("c");
    let summary = ar.pack(&src, &base, &kib(1), None).unwrap();

    let victim = &summary.parts[1];
    let mut bytes = fs::read(victim).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(victim, bytes).unwrap();

    let dest = tmp.path().join("never");
    let err = ar.unpack(&base, &dest, &UnpackOptions::default(), None).unwrap_err();
    match err {
        Error::Integrity { expected, computed } => {
            assert_eq!(expected, summary.content_digest);
            assert_ne!(expected, computed);
        }
        other => panic!("expected Integrity, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[test]
fn test_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = Archive::new().verify(tmp.path().join("nothing")).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_missing_header_delimiter() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.ira");
    fs::write(&path, b"1.0.0,abc,1,1 but no newline").unwrap();

    let err = Archive::new().verify(&path).unwrap_err();
    match err {
        Error::Format { file, .. } => assert_eq!(file, path),
        other => panic!("expected Format, got {other:?}"),
    }
}

#[test]
fn test_unpack_into_existing_directory_merges() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write_tree(&src, &[("sub/new.txt", b"new"), ("keep.txt", b"replaced")]);

    let dest = tmp.path().join("dest");
    write_tree(&dest, &[("keep.txt", b"old"), ("other.txt", b"untouched")]);

    let ar = Archive::new();
    let base = tmp.path().join("merge");
    ar.pack(&src, &base, &PackOptions::default(), None).unwrap();
    ar.unpack(&base, &dest, &UnpackOptions::default(), None).unwrap();

    assert_eq!(fs::read(dest.join("keep.txt")).unwrap(), b"replaced");
    assert_eq!(fs::read(dest.join("sub/new.txt")).unwrap(), b"new");
    assert_eq!(fs::read(dest.join("other.txt")).unwrap(), b"untouched");
    let staging_left = staging_dirs(tmp.path());
    assert!(staging_left.is_empty(), "{staging_left:?}");
}

#[test]
fn test_in_place_unpack() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("a.txt");
    fs::write(&file, b"in place").unwrap();

    let ar = Archive::new();
    let base = tmp.path().join("ip");
    ar.pack(&file, &base, &PackOptions::default(), None).unwrap();

    let dest = tmp.path().join("deep/nested/dest");
    ar.unpack(&base, &dest, &UnpackOptions { staged: false }, None).unwrap();
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"in place");
}

#[test]
fn test_inspect_reports_missing_without_failing() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("i");
    let writer = PartWriter::new(&base, FORMAT_VERSION).unwrap();
    let written = writer.write(&pseudo_random(2500, 6), ChunkPolicy::from_bytes(1000).unwrap(), |_, _, _| {}).unwrap();
    fs::remove_file(&written.paths[0]).unwrap();

    let index = Archive::new().inspect(&base).unwrap();
    assert_eq!(index.records.iter().map(|r| r.part_index).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(index.records.iter().map(|r| r.payload_size).collect::<Vec<_>>(), vec![1000, 500]);
    assert_eq!(index.missing, vec![1]);
    assert!(!index.is_complete());

    let json = index.to_json().unwrap();
    let back = ira::PartIndex::from_json(&json).unwrap();
    assert_eq!(back.records, index.records);
}

#[test]
fn test_invalid_options_rejected() {
    assert!(matches!(ChunkPolicy::from_kib(0), Err(Error::InvalidChunkSize(0))));
    assert!(matches!(ChunkPolicy::from_kib(-2), Err(Error::InvalidChunkSize(-2))));
    assert!(matches!(PartWriter::new("x", "1,0"), Err(Error::InvalidVersion(_))));

    let tmp = TempDir::new().unwrap();
    let opts = PackOptions { format_version: "bad\nversion".into(), ..Default::default() };
    let err = Archive::new().pack(tmp.path(), tmp.path().join("o"), &opts, None).unwrap_err();
    assert!(matches!(err, Error::InvalidVersion(_)));
    assert!(!tmp.path().join("o.ira").exists());
}

fn staging_dirs(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir).unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(".ira-staging-"))
        .collect()
}

#[test]
fn test_compression_level_reaches_codec() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("text.txt");
    let data = b"the same line over and over\n".repeat(6000);
    fs::write(&file, &data).unwrap();

    let ar = Archive::new();
    let level = |n| PackOptions { compression_level: Some(n), ..Default::default() };
    let stored = ar.pack(&file, tmp.path().join("l0"), &level(0), None).unwrap();
    let best = ar.pack(&file, tmp.path().join("l9"), &level(9), None).unwrap();

    assert!(stored.payload_len > data.len(), "{}", stored.payload_len);
    assert!(best.payload_len < data.len() / 10, "{}", best.payload_len);
    assert_ne!(stored.content_digest, best.content_digest);

    for base in ["l0", "l9"] {
        let dest = tmp.path().join(format!("out_{base}"));
        ar.unpack(tmp.path().join(base), &dest, &UnpackOptions::default(), None).unwrap();
        assert_eq!(fs::read(dest.join("text.txt")).unwrap(), data);
    }

    // With no level in the options the codec's own setting applies.
    let stored_codec = Archive::with_parts(ZipDeflate::with_level(Some(0)), FsPartSource);
    let fallback = stored_codec.pack(&file, tmp.path().join("codec0"), &PackOptions::default(), None).unwrap();
    assert_eq!(fallback.payload_len, stored.payload_len);
}

#[test]
fn test_entry_escaping_destination_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("ok.txt", opts).unwrap();
    zip.write_all(b"harmless").unwrap();
    zip.start_file("../evil.txt", opts).unwrap();
    zip.write_all(b"escaped").unwrap();
    let payload = zip.finish().unwrap().into_inner();

    let base = tmp.path().join("z");
    PartWriter::new(&base, FORMAT_VERSION).unwrap()
        .write(&payload, ChunkPolicy::Unsplit, |_, _, _| {})
        .unwrap();

    let dest = tmp.path().join("d");
    let err = Archive::new().unpack(&base, &dest, &UnpackOptions::default(), None).unwrap_err();
    match err {
        Error::Codec(CodecError::UnsafeEntry(name)) => assert_eq!(name, "../evil.txt"),
        other => panic!("expected UnsafeEntry, got {other:?}"),
    }
    assert!(!dest.exists());
    assert!(!tmp.path().join("evil.txt").exists());
    assert!(staging_dirs(tmp.path()).is_empty());
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_repack_with_fewer_parts_warns_about_stale_files() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().join("s");
    let writer = PartWriter::new(&base, FORMAT_VERSION).unwrap();
    let policy = ChunkPolicy::from_bytes(1000).unwrap();
    let first = writer.write(&pseudo_random(4000, 8), policy, |_, _, _| {}).unwrap();
    assert_eq!(first.paths.len(), 4);

    let logs = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let second = tracing::subscriber::with_default(subscriber, || {
        writer.write(&pseudo_random(2000, 9), policy, |_, _, _| {}).unwrap()
    });

    assert_eq!(second.paths, first.paths[..2].to_vec());
    let text = logs.text();
    for stale in &first.paths[2..] {
        assert!(stale.exists());
        assert!(text.contains(&stale.display().to_string()), "{text}");
    }
    for fresh in &second.paths {
        assert!(!text.contains(&fresh.display().to_string()), "{text}");
    }

    // The leftovers still belong to the set and break it on read.
    match Archive::new().verify(&base) {
        Err(Error::InconsistentHeader { file, field, .. }) => {
            assert_eq!(file, first.paths[2]);
            assert_eq!(field, HeaderField::ContentDigest);
        }
        other => panic!("expected InconsistentHeader, got {other:?}"),
    }
}
