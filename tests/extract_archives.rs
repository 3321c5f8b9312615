//! End-to-end extraction of NWA, NWK and OVK containers from disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nwa_extract::{
    ArchiveExtractor, Codec, CodecError, ContainerKind, ExtractConfig, ExtractError,
    LocalFileReader, NwaDecoder,
};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

/// Build a multi-stream archive: header, records, then each payload in order.
fn build_archive(kind: ContainerKind, entries: &[(i32, &[u8])]) -> Vec<u8> {
    let record_size = kind.record_size();
    let mut offset = 4 + entries.len() * record_size;

    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as i32).to_le_bytes());
    for (id, payload) in entries {
        out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        out.extend_from_slice(&(offset as i32).to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
        if record_size == 16 {
            out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        }
        offset += payload.len();
    }
    for (_, payload) in entries {
        out.extend_from_slice(payload);
    }
    out
}

/// Uncompressed 16-bit NWA stream.
fn raw_nwa(channels: i16, samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::new();
    let fields: [i32; 10] = [
        22050,                      // sample rate
        -1,                         // compression level
        0,                          // run length
        0,                          // blocks
        samples.len() as i32 * 2,   // data size
        0,                          // compressed size
        samples.len() as i32,       // sample count
        0,                          // block size
        0,                          // rest size
        0,                          // reserved
    ];
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&16i16.to_le_bytes());
    for f in fields {
        out.extend_from_slice(&f.to_le_bytes());
    }
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

fn write_input(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn outputs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

fn wav_samples(path: &Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .into_samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

/// Stand-in codec that makes decoded output easy to recognize.
struct Reverse;

impl Codec for Reverse {
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.iter().rev().copied().collect())
    }
}

fn extractor_with(
    config: &ExtractConfig,
    codec: Arc<dyn Codec>,
) -> ArchiveExtractor<LocalFileReader> {
    let reader = LocalFileReader::new(&config.input).unwrap();
    ArchiveExtractor::new(Arc::new(reader), codec, config)
}

// ============================================================================
// Single stream
// ============================================================================

#[tokio::test]
async fn test_single_stream_decodes_whole_file() {
    let dir = TempDir::new().unwrap();
    let samples = [0i16, 512, -512, 1024, -1024, 0];
    let stream = raw_nwa(2, &samples);
    let input = write_input(&dir, "bgm01.nwa", &stream);

    let config = ExtractConfig::new(&input, None, None).unwrap();
    let report = ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    let expected_path = dir.path().join("bgm01.wav");
    assert_eq!(report.entries, 1);
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.written[0].path, expected_path);

    let written = std::fs::read(&expected_path).unwrap();
    assert_eq!(written, NwaDecoder::new().decode(&stream).unwrap());
    assert_eq!(wav_samples(&expected_path), samples);
}

#[tokio::test]
async fn test_single_stream_decode_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, "broken.nwa", b"not an nwa stream");
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("broken")), None).unwrap();
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert!(matches!(err, ExtractError::DecodeFailed { index: 0, .. }));
    assert!(outputs(&out).is_empty());
}

// ============================================================================
// Multi stream
// ============================================================================

#[tokio::test]
async fn test_ovk_entries_are_copied_verbatim() {
    // Two 16-byte records; payloads start right after the index at 36.
    let dir = TempDir::new().unwrap();
    let archive = build_archive(
        ContainerKind::Ovk,
        &[
            (1, &[0xDE, 0xAD, 0xBE, 0xEF][..]),
            (2, &[0xCA, 0xFE, 0xBA, 0xBE][..]),
        ],
    );
    assert_eq!(&archive[36..40], &[0xDE, 0xAD, 0xBE, 0xEF]);
    let input = write_input(&dir, "z0001.ovk", &archive);
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("z0001")), None).unwrap();
    let report = ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    assert_eq!(report.entries, 2);
    assert_eq!(report.bytes_written(), 8);
    assert_eq!(
        outputs(&out),
        vec![out.join("z0001-1.ogg"), out.join("z0001-2.ogg")]
    );
    assert_eq!(
        std::fs::read(out.join("z0001-1.ogg")).unwrap(),
        [0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert_eq!(
        std::fs::read(out.join("z0001-2.ogg")).unwrap(),
        [0xCA, 0xFE, 0xBA, 0xBE]
    );
}

#[tokio::test]
async fn test_nwk_entries_go_through_codec() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(ContainerKind::Nwk, &[(10, &b"abc"[..]), (20, &b"hello"[..])]);
    let input = write_input(&dir, "voice.nwk", &archive);

    let config = ExtractConfig::new(&input, None, None).unwrap();
    extractor_with(&config, Arc::new(Reverse)).run().await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("voice-10.wav")).unwrap(), b"cba");
    assert_eq!(std::fs::read(dir.path().join("voice-20.wav")).unwrap(), b"olleh");
}

#[tokio::test]
async fn test_nwk_entries_decode_to_wav() {
    let dir = TempDir::new().unwrap();
    let first = raw_nwa(1, &[1, 2, 3]);
    let second = raw_nwa(2, &[-7, 7, -8, 8]);
    let archive = build_archive(ContainerKind::Nwk, &[(100, first.as_slice()), (101, second.as_slice())]);
    let input = write_input(&dir, "koe.nwk", &archive);

    let config = ExtractConfig::new(&input, None, None).unwrap();
    let report = ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    assert_eq!(report.written.len(), 2);
    assert_eq!(wav_samples(&dir.path().join("koe-100.wav")), [1, 2, 3]);
    assert_eq!(wav_samples(&dir.path().join("koe-101.wav")), [-7, 7, -8, 8]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_entries_extract_concurrently() {
    let dir = TempDir::new().unwrap();
    let payloads: Vec<Vec<u8>> = (0..64u8).map(|i| vec![i; 16 + i as usize]).collect();
    let entries: Vec<(i32, &[u8])> = payloads
        .iter()
        .enumerate()
        .map(|(i, p)| (1000 + i as i32, p.as_slice()))
        .collect();
    let input = write_input(&dir, "many.ovk", &build_archive(ContainerKind::Ovk, &entries));
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("many")), None).unwrap();
    let report = ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    assert_eq!(report.written.len(), 64);
    assert_eq!(outputs(&out).len(), 64);
    for (i, entry) in report.written.iter().enumerate() {
        assert_eq!(entry.index, i);
        assert_eq!(entry.path, out.join(format!("many-{}.ogg", 1000 + i)));
        assert_eq!(std::fs::read(&entry.path).unwrap(), payloads[i]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bounded_concurrency_gives_same_outputs() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(i32, &[u8])> = vec![
        (1, &b"one"[..]),
        (2, &b"two"[..]),
        (3, &b"three"[..]),
        (4, &b"four"[..]),
    ];
    let input = write_input(&dir, "capped.ovk", &build_archive(ContainerKind::Ovk, &entries));

    let unbounded = dir.path().join("a");
    let config = ExtractConfig::new(&input, Some(unbounded.join("v")), None).unwrap();
    ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    let capped = dir.path().join("b");
    let config = ExtractConfig::new(&input, Some(capped.join("v")), None)
        .unwrap()
        .with_max_in_flight(Some(1));
    ArchiveExtractor::open(&config).unwrap().run().await.unwrap();

    for id in 1..=4 {
        let name = format!("v-{id}.ogg");
        assert_eq!(
            std::fs::read(unbounded.join(&name)).unwrap(),
            std::fs::read(capped.join(&name)).unwrap()
        );
    }
}

#[tokio::test]
async fn test_rerun_produces_identical_outputs() {
    let dir = TempDir::new().unwrap();
    let stream = raw_nwa(1, &[5, -5, 50, -50]);
    let archive = build_archive(ContainerKind::Nwk, &[(7, stream.as_slice()), (8, stream.as_slice())]);
    let input = write_input(&dir, "again.nwk", &archive);
    let config = ExtractConfig::new(&input, None, None).unwrap();

    ArchiveExtractor::open(&config).unwrap().run().await.unwrap();
    let first: Vec<Vec<u8>> = ["again-7.wav", "again-8.wav"]
        .iter()
        .map(|n| std::fs::read(dir.path().join(n)).unwrap())
        .collect();

    ArchiveExtractor::open(&config).unwrap().run().await.unwrap();
    let second: Vec<Vec<u8>> = ["again-7.wav", "again-8.wav"]
        .iter()
        .map(|n| std::fs::read(dir.path().join(n)).unwrap())
        .collect();

    assert_eq!(first, second);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_non_positive_entry_count_is_rejected() {
    for count in [0i32, -3] {
        let dir = TempDir::new().unwrap();
        let mut archive = count.to_le_bytes().to_vec();
        archive.extend_from_slice(&[0u8; 64]);
        let input = write_input(&dir, "empty.ovk", &archive);
        let out = dir.path().join("out");

        let config = ExtractConfig::new(&input, Some(out.join("empty")), None).unwrap();
        let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

        assert!(matches!(
            err,
            ExtractError::MalformedContainer { kind: ContainerKind::Ovk, count: c } if c == count
        ));
        assert!(outputs(&out).is_empty());
    }
}

#[tokio::test]
async fn test_invalid_record_fails_whole_run() {
    let dir = TempDir::new().unwrap();
    let mut archive = build_archive(
        ContainerKind::Ovk,
        &[(1, &b"aaaa"[..]), (2, &b"bbbb"[..]), (3, &b"cccc"[..])],
    );
    // Zero the offset of the middle record (4-byte header + 16 + 4).
    archive[24..28].copy_from_slice(&0i32.to_le_bytes());
    let input = write_input(&dir, "bad.ovk", &archive);
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("bad")), None).unwrap();
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert!(matches!(
        err,
        ExtractError::InvalidEntry {
            index: 1,
            offset: 0,
            size: 4
        }
    ));
    assert!(outputs(&out).is_empty());
}

#[tokio::test]
async fn test_zero_size_record_fails_whole_run() {
    let dir = TempDir::new().unwrap();
    let mut archive = build_archive(ContainerKind::Nwk, &[(1, &b"aaaa"[..]), (2, &b"bbbb"[..])]);
    // Size field of the first 12-byte record.
    archive[4..8].copy_from_slice(&0i32.to_le_bytes());
    let input = write_input(&dir, "bad.nwk", &archive);
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("bad")), None).unwrap();
    let err = extractor_with(&config, Arc::new(Reverse)).run().await.unwrap_err();

    assert_eq!(err.entry_index(), Some(0));
    assert!(matches!(err, ExtractError::InvalidEntry { size: 0, .. }));
    assert!(outputs(&out).is_empty());
}

#[tokio::test]
async fn test_truncated_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut archive = 5i32.to_le_bytes().to_vec();
    archive.extend_from_slice(&[1u8; 30]);
    let input = write_input(&dir, "short.nwk", &archive);

    let config = ExtractConfig::new(&input, None, None).unwrap();
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert!(matches!(
        err,
        ExtractError::TruncatedIndex {
            entry: 2,
            expected: 12,
            actual: 6,
            ..
        }
    ));
}

// Current-thread runtime: every unit starts its I/O before any finishes, so
// no sibling is skipped by the failure.
#[tokio::test]
async fn test_short_read_reports_one_failure_without_deadlock() {
    let dir = TempDir::new().unwrap();
    let payloads: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 32]).collect();
    let entries: Vec<(i32, &[u8])> = payloads
        .iter()
        .enumerate()
        .map(|(i, p)| (i as i32, p.as_slice()))
        .collect();
    let mut archive = build_archive(ContainerKind::Ovk, &entries);
    // Cut the last payload short.
    archive.truncate(archive.len() - 10);
    let input = write_input(&dir, "cut.ovk", &archive);
    let out = dir.path().join("out");

    let config = ExtractConfig::new(&input, Some(out.join("cut")), None).unwrap();
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert!(matches!(
        err,
        ExtractError::ShortRead {
            index: 5,
            expected: 32,
            actual: 22
        }
    ));
    assert!(!out.join("cut-5.ogg").exists());
    // Siblings are not rolled back.
    let expected: Vec<PathBuf> = (0..5).map(|i| out.join(format!("cut-{i}.ogg"))).collect();
    assert_eq!(outputs(&out), expected);
    for (i, path) in expected.iter().enumerate() {
        assert_eq!(std::fs::read(path).unwrap(), payloads[i]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failure_with_bounded_concurrency_still_completes() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(i32, &[u8])> = (0..8).map(|i| (i, b"payload!".as_slice())).collect();
    let mut archive = build_archive(ContainerKind::Ovk, &entries);
    // Point the first record past the end of the file.
    archive[8..12].copy_from_slice(&10_000i32.to_le_bytes());
    let input = write_input(&dir, "capped.ovk", &archive);

    let config = ExtractConfig::new(&input, None, None)
        .unwrap()
        .with_max_in_flight(Some(1));
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert!(matches!(
        err,
        ExtractError::ShortRead {
            index: 0,
            expected: 8,
            actual: 0
        }
    ));
}

#[tokio::test]
async fn test_failure_skips_units_not_yet_started() {
    let dir = TempDir::new().unwrap();
    let entries: Vec<(i32, &[u8])> = (0..8).map(|i| (i, b"payload!".as_slice())).collect();
    let mut archive = build_archive(ContainerKind::Ovk, &entries);
    archive[8..12].copy_from_slice(&10_000i32.to_le_bytes());
    let input = write_input(&dir, "skipped.ovk", &archive);
    let out = dir.path().join("out");

    // One unit at a time: entry 0 fails first and every later unit sees it
    // before touching the source.
    let config = ExtractConfig::new(&input, Some(out.join("skipped")), None)
        .unwrap()
        .with_max_in_flight(Some(1));
    let err = ArchiveExtractor::open(&config).unwrap().run().await.unwrap_err();

    assert_eq!(err.entry_index(), Some(0));
    assert!(outputs(&out).is_empty());
}

#[tokio::test]
async fn test_missing_input_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = ExtractConfig::new(dir.path().join("absent.ovk"), None, None).unwrap();

    let err = ArchiveExtractor::open(&config).err().unwrap();
    assert!(matches!(err, ExtractError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn test_list_reads_index_without_extracting() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(ContainerKind::Ovk, &[(42, &b"xyz"[..])]);
    let input = write_input(&dir, "listed.ovk", &archive);

    let config = ExtractConfig::new(&input, None, None).unwrap();
    let table = ArchiveExtractor::open(&config).unwrap().read_index().await.unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0].sequence_id, 42);
    assert_eq!(table.records()[0].offset, 20);
    assert_eq!(table.records()[0].original_size, 3);
    assert!(!dir.path().join("listed-42.ogg").exists());
}
