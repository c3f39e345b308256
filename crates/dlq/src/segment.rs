// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment file format and low-level readers/writers.
//!
//! A segment is a fixed 46-byte header followed by length-prefixed
//! zstd-compressed records:
//!
//! ```text
//! offset  size  field
//! 0       6     magic = "NRDQv1"
//! 6       8     record_count, u64 big-endian
//! 14      32    SHA-256 over the record bytes (prefixes + payloads)
//! 46      ...   records: u32 big-endian length, then that many bytes
//! ```
//!
//! The header of the active segment holds a zero count and zero hash;
//! sealing rewrites it in place and fsyncs. A zeroed header is therefore the
//! marker of a crash survivor, which recovery rescans and seals.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};

/// Magic bytes identifying a segment file.
pub const MAGIC: &[u8; 6] = b"NRDQv1";

/// Total header length in bytes.
pub const HEADER_LEN: usize = 46;

const COUNT_RANGE: std::ops::Range<usize> = 6..14;
const HASH_RANGE: std::ops::Range<usize> = 14..46;

/// Timestamp layout inside segment file names.
const NAME_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// A sealed, immutable segment known to the store.
#[derive(Debug, Clone)]
pub(crate) struct SealedSegment {
    pub path: PathBuf,
    pub bytes: u64,
    pub record_count: u64,
    pub created: Option<DateTime<Utc>>,
}

/// The single active segment accepting appends.
#[derive(Debug)]
pub(crate) struct SegmentWriter {
    file: File,
    path: PathBuf,
    hasher: Sha256,
    record_count: u64,
    bytes: u64,
    created: DateTime<Utc>,
}

impl SegmentWriter {
    /// Creates a fresh segment with a zeroed header. Rapid rotation within
    /// one second appends a `_<n>` suffix; `.` sorts before `_`, so
    /// lexicographic order still equals append order.
    pub(crate) fn create(dir: &Path) -> std::io::Result<Self> {
        let created = Utc::now();
        let base = format!("segment_{}", created.format(NAME_TIME_FORMAT));
        let mut path = dir.join(format!("{base}.dlq"));
        let mut suffix = 1u32;
        while path.exists() {
            path = dir.join(format!("{base}_{suffix}.dlq"));
            suffix += 1;
        }

        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        file.write_all(&header)?;

        Ok(Self {
            file,
            path,
            hasher: Sha256::new(),
            record_count: 0,
            bytes: HEADER_LEN as u64,
            created,
        })
    }

    /// Appends one already-compressed record.
    pub(crate) fn append(&mut self, compressed: &[u8]) -> std::io::Result<()> {
        let prefix = (compressed.len() as u32).to_be_bytes();
        self.file.write_all(&prefix)?;
        self.file.write_all(compressed)?;
        self.hasher.update(prefix);
        self.hasher.update(compressed);
        self.record_count += 1;
        self.bytes += 4 + compressed.len() as u64;
        Ok(())
    }

    /// File length so far, including the header.
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Display form of the segment path, for logs and errors.
    pub(crate) fn path_display(&self) -> String {
        self.path.display().to_string()
    }

    /// Records appended so far.
    pub(crate) fn record_count(&self) -> u64 {
        self.record_count
    }

    pub(crate) fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Writes the final header and fsyncs, making the segment verifiable and
    /// replayable.
    pub(crate) fn seal(mut self) -> std::io::Result<SealedSegment> {
        let digest = self.hasher.finalize();
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[COUNT_RANGE].copy_from_slice(&self.record_count.to_be_bytes());
        header[HASH_RANGE].copy_from_slice(&digest);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_all()?;

        Ok(SealedSegment {
            path: self.path,
            bytes: self.bytes,
            record_count: self.record_count,
            created: Some(self.created),
        })
    }

    /// Removes an empty active segment instead of sealing a record-less file.
    pub(crate) fn discard(self) -> std::io::Result<()> {
        drop(self.file);
        std::fs::remove_file(&self.path)
    }
}

/// Sequential record reader over a sealed segment.
pub(crate) struct RecordReader {
    reader: BufReader<File>,
}

impl RecordReader {
    pub(crate) fn open(path: &Path) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let _ = file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Next compressed record and its on-disk size (prefix included), or
    /// `None` at a clean end of file.
    pub(crate) fn next_record(&mut self) -> std::io::Result<Option<(Vec<u8>, u64)>> {
        let mut prefix = [0u8; 4];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(prefix) as usize;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        Ok(Some((payload, 4 + len as u64)))
    }
}

/// Result of checking a sealed segment against its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerifyResult {
    /// Hash and magic match.
    Valid,
    /// Magic or hash mismatch.
    Corrupt,
}

/// Recomputes the SHA-256 of the record stream and compares it with the
/// sealed header.
pub(crate) fn verify_segment(path: &Path) -> std::io::Result<VerifyResult> {
    let mut file = File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = file.read_exact(&mut header) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(VerifyResult::Corrupt);
        }
        return Err(e);
    }
    if &header[..MAGIC.len()] != MAGIC {
        return Ok(VerifyResult::Corrupt);
    }

    let mut hasher = Sha256::new();
    let mut reader = BufReader::new(file);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    let digest = hasher.finalize();
    if digest.as_slice() == &header[HASH_RANGE] {
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Corrupt)
    }
}

/// Outcome of startup recovery for one on-disk file.
#[derive(Debug)]
pub(crate) enum Recovery {
    /// The file already carried a sealed header.
    AlreadySealed(SealedSegment),
    /// A crash survivor was rescanned and sealed in place; `truncated` is
    /// true when a partial tail was discarded.
    Resealed {
        segment: SealedSegment,
        truncated: bool,
    },
    /// The file held no complete record and was removed.
    Removed,
    /// The file is not a segment (bad magic); the caller quarantines it.
    Corrupt,
}

/// Inspects one `*.dlq` file on startup, sealing crash survivors in place.
///
/// Records are scanned up to the last parseable boundary; bytes past it are
/// discarded. No partial record ever becomes replayable.
pub(crate) fn recover_segment(path: &Path) -> std::io::Result<Recovery> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() < HEADER_LEN as u64 {
        std::fs::remove_file(path)?;
        return Ok(Recovery::Removed);
    }

    let mut header = [0u8; HEADER_LEN];
    {
        let mut file = File::open(path)?;
        file.read_exact(&mut header)?;
    }
    if &header[..MAGIC.len()] != MAGIC {
        return Ok(Recovery::Corrupt);
    }

    let record_count = u64::from_be_bytes(
        header[COUNT_RANGE]
            .try_into()
            .expect("count field is 8 bytes"),
    );
    let hash_is_zero = header[HASH_RANGE].iter().all(|&b| b == 0);
    if record_count != 0 && !hash_is_zero {
        return Ok(Recovery::AlreadySealed(SealedSegment {
            path: path.to_path_buf(),
            bytes: metadata.len(),
            record_count,
            created: created_from_name(path),
        }));
    }

    // Crash survivor: rescan the record stream.
    let mut hasher = Sha256::new();
    let mut count = 0u64;
    let mut valid_end = HEADER_LEN as u64;
    {
        let mut reader = RecordReader::open(path)?;
        loop {
            match reader.next_record() {
                Ok(Some((payload, on_disk))) => {
                    hasher.update((payload.len() as u32).to_be_bytes());
                    hasher.update(&payload);
                    count += 1;
                    valid_end += on_disk;
                }
                Ok(None) => break,
                // A short read means a partial tail; cut there.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
    }

    if count == 0 {
        std::fs::remove_file(path)?;
        return Ok(Recovery::Removed);
    }

    let truncated = valid_end < metadata.len();
    let digest = hasher.finalize();
    let mut sealed_header = [0u8; HEADER_LEN];
    sealed_header[..MAGIC.len()].copy_from_slice(MAGIC);
    sealed_header[COUNT_RANGE].copy_from_slice(&count.to_be_bytes());
    sealed_header[HASH_RANGE].copy_from_slice(&digest);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    if truncated {
        file.set_len(valid_end)?;
    }
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&sealed_header)?;
    file.sync_all()?;

    Ok(Recovery::Resealed {
        segment: SealedSegment {
            path: path.to_path_buf(),
            bytes: valid_end,
            record_count: count,
            created: created_from_name(path),
        },
        truncated,
    })
}

/// Parses the creation time back out of a segment file name.
pub(crate) fn created_from_name(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix("segment_")?.get(..16)?;
    NaiveDateTime::parse_from_str(stamp, NAME_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sealed_header_layout_is_bit_exact() {
        let dir = tempdir().expect("tempdir");
        let mut writer = SegmentWriter::create(dir.path()).expect("create");
        let records: Vec<Vec<u8>> = (0..3).map(|i| vec![i as u8; 10 + i]).collect();
        let mut expected_stream = Vec::new();
        for record in &records {
            writer.append(record).expect("append");
            expected_stream.extend_from_slice(&(record.len() as u32).to_be_bytes());
            expected_stream.extend_from_slice(record);
        }
        let sealed = writer.seal().expect("seal");

        let raw = std::fs::read(&sealed.path).expect("read file");
        assert_eq!(&raw[..6], b"NRDQv1");
        assert_eq!(u64::from_be_bytes(raw[6..14].try_into().expect("8")), 3);
        let digest = Sha256::digest(&raw[HEADER_LEN..]);
        assert_eq!(&raw[14..46], digest.as_slice());
        assert_eq!(&raw[HEADER_LEN..], expected_stream.as_slice());
        assert_eq!(sealed.bytes, raw.len() as u64);
    }

    #[test]
    fn active_segment_header_is_zeroed_until_sealed() {
        let dir = tempdir().expect("tempdir");
        let mut writer = SegmentWriter::create(dir.path()).expect("create");
        writer.append(b"payload").expect("append");
        let path = writer.path.clone();

        let raw = std::fs::read(&path).expect("read file");
        assert_eq!(&raw[..6], b"NRDQv1");
        assert!(raw[6..46].iter().all(|&b| b == 0));
        let _ = writer.seal().expect("seal");
    }

    #[test]
    fn verify_detects_a_flipped_byte() {
        let dir = tempdir().expect("tempdir");
        let mut writer = SegmentWriter::create(dir.path()).expect("create");
        writer.append(&[7u8; 64]).expect("append");
        let sealed = writer.seal().expect("seal");
        assert_eq!(
            verify_segment(&sealed.path).expect("verify"),
            VerifyResult::Valid
        );

        let mut raw = std::fs::read(&sealed.path).expect("read");
        raw[HEADER_LEN + 10] ^= 0x01;
        std::fs::write(&sealed.path, &raw).expect("write back");
        assert_eq!(
            verify_segment(&sealed.path).expect("verify"),
            VerifyResult::Corrupt
        );
    }

    #[test]
    fn recovery_seals_a_crash_survivor_and_cuts_the_partial_tail() {
        let dir = tempdir().expect("tempdir");
        let mut writer = SegmentWriter::create(dir.path()).expect("create");
        writer.append(b"first record").expect("append");
        writer.append(b"second record").expect("append");
        let path = writer.path.clone();
        // Simulate a crash: no seal, then a torn write of a third record.
        drop(writer);
        {
            let mut file = OpenOptions::new().append(true).open(&path).expect("open");
            file.write_all(&100u32.to_be_bytes()).expect("torn prefix");
            file.write_all(b"only ten b").expect("torn payload");
        }

        let recovery = recover_segment(&path).expect("recover");
        let Recovery::Resealed { segment, truncated } = recovery else {
            panic!("expected reseal, got {recovery:?}");
        };
        assert!(truncated);
        assert_eq!(segment.record_count, 2);
        assert_eq!(
            verify_segment(&path).expect("verify"),
            VerifyResult::Valid,
            "resealed segment must verify"
        );

        // The two whole records survive, nothing partial is readable.
        let mut reader = RecordReader::open(&path).expect("open reader");
        let (first, _) = reader.next_record().expect("read").expect("record one");
        let (second, _) = reader.next_record().expect("read").expect("record two");
        assert_eq!(first, b"first record");
        assert_eq!(second, b"second record");
        assert!(reader.next_record().expect("read").is_none());
    }

    #[test]
    fn recovery_removes_an_empty_survivor() {
        let dir = tempdir().expect("tempdir");
        let writer = SegmentWriter::create(dir.path()).expect("create");
        let path = writer.path.clone();
        drop(writer);
        let recovery = recover_segment(&path).expect("recover");
        assert!(matches!(recovery, Recovery::Removed));
        assert!(!path.exists());
    }

    #[test]
    fn recovery_flags_foreign_files_as_corrupt() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("segment_20260101T000000Z.dlq");
        std::fs::write(&path, b"definitely not a segment header here").expect("write");
        let recovery = recover_segment(&path).expect("recover");
        assert!(matches!(recovery, Recovery::Corrupt));
    }

    #[test]
    fn rotation_name_collisions_keep_lexicographic_order() {
        let dir = tempdir().expect("tempdir");
        let first = SegmentWriter::create(dir.path()).expect("create");
        let second = SegmentWriter::create(dir.path()).expect("create");
        let a = first.path.file_name().expect("name").to_owned();
        let b = second.path.file_name().expect("name").to_owned();
        assert_ne!(a, b);
        assert!(a < b, "{a:?} must sort before {b:?}");
        let _ = first.discard();
        let _ = second.discard();
    }

    #[test]
    fn created_time_parses_from_the_file_name() {
        let path = Path::new("/spool/segment_20260801T101112Z.dlq");
        let created = created_from_name(path).expect("parses");
        assert_eq!(created.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-08-01 10:11:12");
        let suffixed = Path::new("/spool/segment_20260801T101112Z_3.dlq");
        assert!(created_from_name(suffixed).is_some());
    }
}
