use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::encode_frame;
use super::ReadFrame;
use super::ReadLimit;
use super::SegmentConfig;
use super::SegmentFile;
use super::SegmentIdentity;
use super::SegmentIndex;
use super::SegmentMeta;
use crate::proto::journal_record::JournalRecord;
use crate::time::timestamp_millis;
use crate::JournalError;
use crate::Result;
use crate::StorageError;
use crate::SEGMENT_APPEND_LATENCY;
use crate::SEGMENT_APPEND_RECORDS;

/// Offset and timestamp bounds of a segment as seen by readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentOffsets {
    pub start_offset: u64,
    /// Exclusive
    pub end_offset: u64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
}

/// State only the appender touches
struct SegmentWriter {
    file_len: u64,
    next_offset: u64,
    last_create_time: u64,
    deleted: bool,
}

/// One open segment: an append-only file plus its indices.
///
/// Appends serialize on `writer`. Readers never take that lock: they load
/// `end_offset` with acquire ordering and only touch frames below it, which
/// the appender published with release ordering after the frame and its
/// index entries were persisted.
pub struct Segment {
    identity: SegmentIdentity,
    config: SegmentConfig,
    file: SegmentFile,
    index: Arc<SegmentIndex>,
    writer: Mutex<SegmentWriter>,

    start_offset: u64,
    end_offset: AtomicU64,
    start_timestamp: AtomicU64,
    end_timestamp: AtomicU64,
    size_bytes: AtomicU64,
    sealed: AtomicBool,
}

impl std::fmt::Debug for Segment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("identity", &self.identity)
            .field("offsets", &self.offsets())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

impl Segment {
    /// Opens (or creates) a segment and recovers its in-memory counters.
    ///
    /// Frames present in the file but missing from the index are indexed,
    /// a torn or corrupt tail is truncated.
    #[instrument(skip(data_dir, config, index))]
    pub fn open(
        identity: SegmentIdentity,
        data_dir: &Path,
        config: SegmentConfig,
        index: Arc<SegmentIndex>,
        start_offset: u64,
    ) -> Result<Self> {
        let file = SegmentFile::open(&identity.file_path(data_dir))?;

        let meta = match index.load_meta(&identity)? {
            Some(meta) => {
                if meta.start_offset != start_offset {
                    warn!(
                        "segment {} persisted start_offset {} differs from requested {}, keeping persisted",
                        identity, meta.start_offset, start_offset
                    );
                }
                meta
            }
            None => {
                let meta = SegmentMeta {
                    start_offset,
                    sealed: false,
                };
                index.save_meta(&identity, &meta)?;
                meta
            }
        };

        let recovered = recover(&identity, &file, &index, meta.start_offset)?;

        info!(
            "segment {} opened: offsets [{}, {}), sealed={}",
            identity, meta.start_offset, recovered.next_offset, meta.sealed
        );

        Ok(Self {
            identity,
            config,
            file,
            index,
            writer: Mutex::new(SegmentWriter {
                file_len: recovered.file_len,
                next_offset: recovered.next_offset,
                last_create_time: recovered.end_timestamp,
                deleted: false,
            }),
            start_offset: meta.start_offset,
            end_offset: AtomicU64::new(recovered.next_offset),
            start_timestamp: AtomicU64::new(recovered.start_timestamp),
            end_timestamp: AtomicU64::new(recovered.end_timestamp),
            size_bytes: AtomicU64::new(recovered.file_len),
            sealed: AtomicBool::new(meta.sealed),
        })
    }

    pub fn identity(&self) -> &SegmentIdentity {
        &self.identity
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Exclusive end of committed data
    pub fn end_offset(&self) -> u64 {
        self.end_offset.load(Ordering::Acquire)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn record_count(&self) -> u64 {
        self.end_offset() - self.start_offset
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Acquire)
    }

    pub fn offsets(&self) -> SegmentOffsets {
        let end_offset = self.end_offset();
        SegmentOffsets {
            start_offset: self.start_offset,
            end_offset,
            start_timestamp: self.start_timestamp.load(Ordering::Acquire),
            end_timestamp: self.end_timestamp.load(Ordering::Acquire),
        }
    }

    pub fn append(
        &self,
        record: JournalRecord,
    ) -> Result<u64> {
        let offsets = self.append_batch(vec![record])?;
        offsets
            .first()
            .copied()
            .ok_or_else(|| JournalError::IoFailure(format!("append to {} returned no offset", self.identity)).into())
    }

    /// Appends `records` atomically: either all of them get consecutive
    /// offsets or none does.
    pub fn append_batch(
        &self,
        records: Vec<JournalRecord>,
    ) -> Result<Vec<u64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let mut writer = self.writer.lock();

        if writer.deleted || self.is_sealed() {
            return Err(JournalError::SegmentSealed(self.identity.to_string()).into());
        }

        let existing = writer.next_offset - self.start_offset;
        let count = records.len() as u64;
        let now = timestamp_millis();

        let mut buf = BytesMut::new();
        let mut frames = Vec::with_capacity(records.len());
        let mut position = writer.file_len;
        let mut create_time = writer.last_create_time;

        for (i, mut record) in records.into_iter().enumerate() {
            create_time = create_time.max(now);
            record.offset = writer.next_offset + i as u64;
            record.create_time = create_time;
            record.namespace = self.identity.namespace.clone();
            record.shard_name = self.identity.shard_name.clone();
            record.segment = self.identity.segment_no;

            let size = encode_frame(&record, &mut buf)? as u64;
            frames.push(ReadFrame {
                record,
                position,
                size,
            });
            position += size;
        }

        let lone_record_into_empty = existing == 0 && count == 1;
        if !lone_record_into_empty
            && (existing + count > self.config.max_records || position > self.config.max_bytes)
        {
            debug!(
                "segment {} full: records {}+{} / {}, bytes {} / {}",
                self.identity, existing, count, self.config.max_records, position, self.config.max_bytes
            );
            return Err(JournalError::SegmentFull(self.identity.to_string()).into());
        }

        self.file.write_at(&buf, writer.file_len)?;
        if self.config.flush_on_append {
            self.file.sync()?;
        }
        self.index.index_frames(&self.identity, &frames)?;

        let offsets: Vec<u64> = frames.iter().map(|f| f.record.offset).collect();
        writer.file_len = position;
        writer.next_offset += count;
        writer.last_create_time = create_time;

        if existing == 0 {
            if let Some(first) = frames.first() {
                self.start_timestamp.store(first.record.create_time, Ordering::Release);
            }
        }
        self.end_timestamp.store(create_time, Ordering::Release);
        self.size_bytes.store(position, Ordering::Release);
        self.end_offset.store(writer.next_offset, Ordering::Release);
        drop(writer);

        SEGMENT_APPEND_RECORDS.inc_by(count);
        SEGMENT_APPEND_LATENCY.observe(started.elapsed().as_secs_f64());
        Ok(offsets)
    }

    /// Records from `start_offset` on, bounded by `limit`.
    ///
    /// Offsets below the segment start are clamped to it. Returns an empty
    /// vector when `start_offset >= end_offset`.
    pub fn read_by_offset(
        &self,
        start_offset: u64,
        limit: ReadLimit,
    ) -> Result<Vec<JournalRecord>> {
        let end = self.end_offset();
        let start = start_offset.max(self.start_offset);
        if start >= end {
            return Ok(Vec::new());
        }

        let mut position = self
            .index
            .position(&self.identity, start)?
            .ok_or_else(|| self.missing_index(start))?;

        let max_records = limit.max_records.max(1);
        let mut records = Vec::new();
        let mut bytes = 0u64;
        let mut offset = start;

        while offset < end && (records.len() as u64) < max_records {
            let frame = self.frame_at(position, offset)?;
            if !records.is_empty() && bytes + frame.size > limit.max_size {
                break;
            }
            bytes += frame.size;
            position = frame.next_position();
            offset += 1;
            records.push(frame.record);
        }
        Ok(records)
    }

    /// First offset whose `create_time >= timestamp`, or `end_offset` when
    /// every committed record is older.
    pub fn offset_for_timestamp(
        &self,
        timestamp: u64,
    ) -> Result<u64> {
        let end = self.end_offset();
        match self.index.offset_at_or_after_timestamp(&self.identity, timestamp)? {
            Some(offset) if offset < end => Ok(offset),
            _ => Ok(end),
        }
    }

    pub fn read_by_timestamp(
        &self,
        timestamp: u64,
        limit: ReadLimit,
    ) -> Result<Vec<JournalRecord>> {
        let start = self.offset_for_timestamp(timestamp)?;
        self.read_by_offset(start, limit)
    }

    pub fn read_by_key(
        &self,
        key: &str,
        start_offset: u64,
        limit: ReadLimit,
    ) -> Result<Vec<JournalRecord>> {
        let max_records = limit.max_records.max(1);
        let offsets = self
            .index
            .offsets_by_key(&self.identity, key, start_offset, max_records as usize)?;
        self.read_offsets(offsets, limit)
    }

    pub fn read_by_tag(
        &self,
        tag: &str,
        start_offset: u64,
        limit: ReadLimit,
    ) -> Result<Vec<JournalRecord>> {
        let max_records = limit.max_records.max(1);
        let offsets = self
            .index
            .offsets_by_tag(&self.identity, tag, start_offset, max_records as usize)?;
        self.read_offsets(offsets, limit)
    }

    /// Marks the segment immutable and returns its end offset.
    ///
    /// Takes the append lock, so no append is in flight once this returns.
    /// Sealing twice is a no-op.
    pub fn seal(&self) -> Result<u64> {
        let writer = self.writer.lock();
        if !self.is_sealed() {
            self.file.sync()?;
            self.index.save_meta(
                &self.identity,
                &SegmentMeta {
                    start_offset: self.start_offset,
                    sealed: true,
                },
            )?;
            self.sealed.store(true, Ordering::Release);
            info!("segment {} sealed at end_offset {}", self.identity, writer.next_offset);
        }
        Ok(writer.next_offset)
    }

    /// Removes the segment file and its indices. The handle rejects appends
    /// afterwards.
    pub fn delete(
        &self,
        data_dir: &Path,
    ) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.deleted = true;
        self.sealed.store(true, Ordering::Release);
        SegmentFile::remove(&self.identity.file_path(data_dir))?;
        self.index.remove_segment(&self.identity)?;
        info!("segment {} deleted", self.identity);
        Ok(())
    }

    fn read_offsets(
        &self,
        offsets: Vec<u64>,
        limit: ReadLimit,
    ) -> Result<Vec<JournalRecord>> {
        let end = self.end_offset();
        let mut records = Vec::new();
        let mut bytes = 0u64;
        for offset in offsets.into_iter().take_while(|o| *o < end) {
            let position = self
                .index
                .position(&self.identity, offset)?
                .ok_or_else(|| self.missing_index(offset))?;
            let frame = self.frame_at(position, offset)?;
            if !records.is_empty() && bytes + frame.size > limit.max_size {
                break;
            }
            bytes += frame.size;
            records.push(frame.record);
        }
        Ok(records)
    }

    fn frame_at(
        &self,
        position: u64,
        expected_offset: u64,
    ) -> Result<ReadFrame> {
        match self.file.read_frame(position)? {
            Some(frame) if frame.record.offset == expected_offset => Ok(frame),
            _ => Err(StorageError::DataCorruption {
                location: format!("{} offset {} at position {}", self.identity, expected_offset, position),
            }
            .into()),
        }
    }

    fn missing_index(
        &self,
        offset: u64,
    ) -> crate::Error {
        StorageError::DataCorruption {
            location: format!("{} has no index entry for committed offset {}", self.identity, offset),
        }
        .into()
    }
}

struct Recovered {
    next_offset: u64,
    file_len: u64,
    start_timestamp: u64,
    end_timestamp: u64,
}

fn recover(
    identity: &SegmentIdentity,
    file: &SegmentFile,
    index: &SegmentIndex,
    start_offset: u64,
) -> Result<Recovered> {
    // Resume after the last indexed frame when it is still intact, otherwise
    // rebuild the indices from the beginning of the file.
    let (mut next_offset, scan_from) = match index.last_indexed(identity)? {
        Some((offset, position)) => match file.read_frame(position) {
            Ok(Some(frame)) if frame.record.offset == offset => (offset + 1, frame.next_position()),
            _ => {
                warn!("segment {} index points past intact data, rebuilding", identity);
                index.truncate_from(identity, start_offset)?;
                (start_offset, 0)
            }
        },
        None => (start_offset, 0),
    };

    let scan = file.scan_from(scan_from)?;
    let mut accepted = Vec::with_capacity(scan.frames.len());
    for frame in scan.frames {
        if frame.record.offset != next_offset {
            warn!(
                "segment {} frame at {} carries offset {}, expected {}",
                identity, frame.position, frame.record.offset, next_offset
            );
            break;
        }
        next_offset += 1;
        accepted.push(frame);
    }

    let file_len = accepted.last().map(|f| f.next_position()).unwrap_or(scan_from);
    if !accepted.is_empty() {
        info!("segment {} re-indexed {} un-indexed frames", identity, accepted.len());
        index.index_frames(identity, &accepted)?;
    }
    if file.len()? > file_len {
        warn!("segment {} truncating torn tail at {}", identity, file_len);
        file.truncate(file_len)?;
    }

    let mut start_timestamp = 0;
    let mut end_timestamp = 0;
    if next_offset > start_offset {
        if let Some(position) = index.position(identity, start_offset)? {
            if let Some(frame) = file.read_frame(position)? {
                start_timestamp = frame.record.create_time;
            }
        }
        if let Some((_, position)) = index.last_indexed(identity)? {
            if let Some(frame) = file.read_frame(position)? {
                end_timestamp = frame.record.create_time;
            }
        }
    }

    Ok(Recovered {
        next_offset,
        file_len,
        start_timestamp,
        end_timestamp,
    })
}
