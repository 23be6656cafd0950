use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use bytes::BytesMut;
use tempfile::tempdir;
use tempfile::TempDir;

use super::*;
use crate::proto::journal_record::JournalRecord;
use crate::Error;
use crate::JournalError;

fn record(
    key: &str,
    content: &str,
    tags: &[&str],
) -> JournalRecord {
    JournalRecord {
        key: key.to_string(),
        content: content.as_bytes().to_vec(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

struct Fixture {
    dir: TempDir,
    index: Arc<SegmentIndex>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let db = sled::Config::default()
            .path(dir.path().join("index"))
            .open()
            .unwrap();
        let index = Arc::new(SegmentIndex::open(&db).unwrap());
        Self { dir, index }
    }

    fn open(
        &self,
        config: SegmentConfig,
        start_offset: u64,
    ) -> Segment {
        Segment::open(
            SegmentIdentity::new("a", "s1", 0),
            self.dir.path(),
            config,
            self.index.clone(),
            start_offset,
        )
        .unwrap()
    }
}

fn unlimited() -> ReadLimit {
    ReadLimit::new(u64::MAX, u64::MAX)
}

#[test]
fn test_append_assigns_contiguous_offsets_from_start() {
    let fx = Fixture::new();
    let segment = fx.open(SegmentConfig::default(), 10);

    assert_eq!(segment.append(record("k", "v0", &[])).unwrap(), 10);
    assert_eq!(segment.append_batch(vec![record("", "v1", &[]), record("", "v2", &[])]).unwrap(), vec![11, 12]);
    assert_eq!(segment.end_offset(), 13);
    assert_eq!(segment.record_count(), 3);

    let records = segment.read_by_offset(10, unlimited()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].key, "k");
    assert_eq!(records[0].content, b"v0");
    assert_eq!(records[0].namespace, "a");
    assert_eq!(records[0].shard_name, "s1");
    assert_eq!(records[2].offset, 12);
    assert!(records.windows(2).all(|w| w[0].create_time <= w[1].create_time));
}

/// # Case 1: start at end_offset returns nothing
/// # Case 2: start below the segment start is clamped
/// # Case 3: max_size smaller than one record still returns one record
/// # Case 4: max_records bounds the result
#[test]
fn test_read_by_offset_bounds() {
    let fx = Fixture::new();
    let segment = fx.open(SegmentConfig::default(), 5);
    for i in 0..5 {
        segment.append(record("", &format!("value-{i}"), &[])).unwrap();
    }

    // Case 1
    assert!(segment.read_by_offset(10, unlimited()).unwrap().is_empty());

    // Case 2
    let records = segment.read_by_offset(0, unlimited()).unwrap();
    assert_eq!(records.first().map(|r| r.offset), Some(5));

    // Case 3
    let records = segment.read_by_offset(6, ReadLimit::new(1, 100)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset, 6);

    // Case 4
    let records = segment.read_by_offset(5, ReadLimit::new(u64::MAX, 2)).unwrap();
    assert_eq!(records.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![5, 6]);
}

#[test]
fn test_segment_full_by_record_count_and_bytes() {
    let fx = Fixture::new();
    let segment = fx.open(
        SegmentConfig {
            max_bytes: 1,
            max_records: 2,
            flush_on_append: false,
        },
        0,
    );

    // An empty segment always accepts one record, even past max_bytes
    assert_eq!(segment.append(record("", "big", &[])).unwrap(), 0);

    let err = segment.append(record("", "next", &[])).unwrap_err();
    assert!(matches!(err, Error::Journal(JournalError::SegmentFull(_))));
    assert_eq!(segment.end_offset(), 1, "rejected append must not consume an offset");
}

#[test]
fn test_segment_full_rejects_whole_batch() {
    let fx = Fixture::new();
    let segment = fx.open(
        SegmentConfig {
            max_bytes: u64::MAX,
            max_records: 3,
            flush_on_append: false,
        },
        0,
    );
    segment.append(record("", "0", &[])).unwrap();
    let err = segment
        .append_batch(vec![record("", "1", &[]), record("", "2", &[]), record("", "3", &[])])
        .unwrap_err();
    assert!(matches!(err, Error::Journal(JournalError::SegmentFull(_))));
    assert_eq!(segment.end_offset(), 1);
    assert_eq!(segment.append_batch(vec![record("", "1", &[]), record("", "2", &[])]).unwrap(), vec![1, 2]);
}

#[test]
fn test_seal_is_idempotent_and_fences_appends() {
    let fx = Fixture::new();
    let segment = fx.open(SegmentConfig::default(), 0);
    segment.append(record("", "v", &[])).unwrap();

    assert_eq!(segment.seal().unwrap(), 1);
    assert_eq!(segment.seal().unwrap(), 1);
    assert!(segment.is_sealed());

    let err = segment.append(record("", "late", &[])).unwrap_err();
    assert!(matches!(err, Error::Journal(JournalError::SegmentSealed(_))));
    // Sealed data stays readable
    assert_eq!(segment.read_by_offset(0, unlimited()).unwrap().len(), 1);
}

#[test]
fn test_sealed_flag_survives_reopen() {
    let fx = Fixture::new();
    {
        let segment = fx.open(SegmentConfig::default(), 0);
        segment.append(record("", "v", &[])).unwrap();
        segment.seal().unwrap();
    }
    let segment = fx.open(SegmentConfig::default(), 0);
    assert!(segment.is_sealed());
    assert_eq!(segment.end_offset(), 1);
}

#[test]
fn test_concurrent_appends_get_unique_increasing_offsets() {
    let fx = Fixture::new();
    let segment = Arc::new(fx.open(SegmentConfig::default(), 0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let segment = segment.clone();
            thread::spawn(move || {
                let mut offsets = Vec::new();
                for i in 0..50 {
                    offsets.push(segment.append(record("", &format!("{t}-{i}"), &[])).unwrap());
                }
                offsets
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let offsets = handle.join().unwrap();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        for offset in offsets {
            assert!(all.insert(offset), "offset {offset} assigned twice");
        }
    }
    assert_eq!(all.len(), 400);
    assert_eq!(segment.end_offset(), 400);
    assert_eq!(*all.iter().max().unwrap(), 399);

    let records = segment.read_by_offset(0, unlimited()).unwrap();
    assert_eq!(records.len(), 400);
}

#[test]
fn test_timestamp_lookup() {
    let fx = Fixture::new();
    let segment = fx.open(SegmentConfig::default(), 0);
    segment.append(record("", "v0", &[])).unwrap();
    let first_time = segment.offsets().start_timestamp;
    std::thread::sleep(std::time::Duration::from_millis(5));
    segment.append(record("", "v1", &[])).unwrap();
    let last_time = segment.offsets().end_timestamp;
    assert!(last_time > first_time);

    assert_eq!(segment.offset_for_timestamp(0).unwrap(), 0);
    assert_eq!(segment.offset_for_timestamp(last_time).unwrap(), 1);
    assert_eq!(segment.offset_for_timestamp(last_time + 1).unwrap(), 2);

    let records = segment.read_by_timestamp(first_time + 1, unlimited()).unwrap();
    assert_eq!(records.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_read_by_key_and_tag() {
    let fx = Fixture::new();
    let segment = fx.open(SegmentConfig::default(), 0);
    segment.append(record("k1", "a", &["red"])).unwrap();
    segment.append(record("k2", "b", &["blue"])).unwrap();
    segment.append(record("k1", "c", &["red", "blue"])).unwrap();

    let by_key = segment.read_by_key("k1", 0, unlimited()).unwrap();
    assert_eq!(by_key.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![0, 2]);

    let by_key = segment.read_by_key("k1", 1, unlimited()).unwrap();
    assert_eq!(by_key.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![2]);

    let by_tag = segment.read_by_tag("blue", 0, ReadLimit::new(u64::MAX, 1)).unwrap();
    assert_eq!(by_tag.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![1]);

    assert!(segment.read_by_tag("green", 0, unlimited()).unwrap().is_empty());
}

#[test]
fn test_reopen_truncates_torn_tail() {
    let fx = Fixture::new();
    let path = SegmentIdentity::new("a", "s1", 0).file_path(fx.dir.path());
    let size_before_garbage = {
        let segment = fx.open(SegmentConfig::default(), 0);
        segment.append(record("", "v0", &[])).unwrap();
        segment.append(record("", "v1", &[])).unwrap();
        segment.size_bytes()
    };

    // half-written frame
    let file = SegmentFile::open(&path).unwrap();
    file.write_at(&[0, 0, 1, 0, 9, 9, 9], size_before_garbage).unwrap();
    drop(file);

    let segment = fx.open(SegmentConfig::default(), 0);
    assert_eq!(segment.end_offset(), 2);
    assert_eq!(segment.size_bytes(), size_before_garbage);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), size_before_garbage);
    assert_eq!(segment.append(record("", "v2", &[])).unwrap(), 2);
    assert_eq!(segment.read_by_offset(0, unlimited()).unwrap().len(), 3);
}

#[test]
fn test_reopen_indexes_frames_missing_from_index() {
    let fx = Fixture::new();
    let identity = SegmentIdentity::new("a", "s1", 0);
    let path = identity.file_path(fx.dir.path());
    let written = {
        let segment = fx.open(SegmentConfig::default(), 0);
        segment.append(record("", "v0", &[])).unwrap();
        segment.size_bytes()
    };

    // A frame that reached the file but not the index
    let mut buf = BytesMut::new();
    let mut orphan = record("orphan", "v1", &["t"]);
    orphan.offset = 1;
    orphan.create_time = crate::time::timestamp_millis();
    encode_frame(&orphan, &mut buf).unwrap();
    SegmentFile::open(&path).unwrap().write_at(&buf, written).unwrap();

    let segment = fx.open(SegmentConfig::default(), 0);
    assert_eq!(segment.end_offset(), 2);
    let by_key = segment.read_by_key("orphan", 0, unlimited()).unwrap();
    assert_eq!(by_key.len(), 1);
    assert_eq!(by_key[0].content, b"v1");
}

#[test]
fn test_delete_removes_file_and_fences_appends() {
    let fx = Fixture::new();
    let identity = SegmentIdentity::new("a", "s1", 0);
    let segment = fx.open(SegmentConfig::default(), 0);
    segment.append(record("k", "v", &[])).unwrap();

    segment.delete(fx.dir.path()).unwrap();
    assert!(!identity.file_path(fx.dir.path()).exists());
    assert!(fx.index.load_meta(&identity).unwrap().is_none());
    assert!(segment.append(record("", "v", &[])).is_err());
}
