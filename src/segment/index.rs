//! Sled-backed indices of every segment hosted on this node.
//!
//! All keys start with the segment prefix
//! `u32 len | namespace | u32 len | shard | u32 segment_no` (big-endian), so a
//! whole segment can be range-scanned or removed by prefix, and offsets sort
//! numerically inside it.

use serde::Deserialize;
use serde::Serialize;
use sled::Batch;
use sled::Tree;
use tracing::trace;

use super::ReadFrame;
use super::SegmentIdentity;
use crate::convert::safe_kv;
use crate::convert::safe_vk;
use crate::Result;
use crate::StorageError;

const OFFSET_INDEX_TREE: &str = "segment_offset_index";
const TIMESTAMP_INDEX_TREE: &str = "segment_timestamp_index";
const KEY_INDEX_TREE: &str = "segment_key_index";
const TAG_INDEX_TREE: &str = "segment_tag_index";
const SEGMENT_META_TREE: &str = "segment_meta";

/// Persisted per-segment state that is not derivable from the frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub start_offset: u64,
    pub sealed: bool,
}

pub struct SegmentIndex {
    offset_tree: Tree,
    timestamp_tree: Tree,
    key_tree: Tree,
    tag_tree: Tree,
    meta_tree: Tree,
}

impl SegmentIndex {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            offset_tree: db.open_tree(OFFSET_INDEX_TREE)?,
            timestamp_tree: db.open_tree(TIMESTAMP_INDEX_TREE)?,
            key_tree: db.open_tree(KEY_INDEX_TREE)?,
            tag_tree: db.open_tree(TAG_INDEX_TREE)?,
            meta_tree: db.open_tree(SEGMENT_META_TREE)?,
        })
    }

    /// Indexes freshly written frames. The offset tree is written last so a
    /// crash in between leaves the frames un-indexed and recovery re-indexes
    /// them.
    pub fn index_frames(
        &self,
        id: &SegmentIdentity,
        frames: &[ReadFrame],
    ) -> Result<()> {
        let prefix = segment_prefix(id);
        let mut offset_batch = Batch::default();
        let mut timestamp_batch = Batch::default();
        let mut key_batch = Batch::default();
        let mut tag_batch = Batch::default();

        for frame in frames {
            let record = &frame.record;
            offset_batch.insert(offset_key(&prefix, record.offset), safe_kv(frame.position).to_vec());

            let mut ts_key = prefix.clone();
            ts_key.extend_from_slice(&safe_kv(record.create_time));
            ts_key.extend_from_slice(&safe_kv(record.offset));
            timestamp_batch.insert(ts_key, Vec::<u8>::new());

            if !record.key.is_empty() {
                key_batch.insert(name_key(&prefix, &record.key, record.offset), Vec::<u8>::new());
            }
            for tag in &record.tags {
                tag_batch.insert(name_key(&prefix, tag, record.offset), Vec::<u8>::new());
            }
        }

        self.timestamp_tree.apply_batch(timestamp_batch)?;
        self.key_tree.apply_batch(key_batch)?;
        self.tag_tree.apply_batch(tag_batch)?;
        self.offset_tree.apply_batch(offset_batch)?;
        trace!("indexed {} frames of {}", frames.len(), id);
        Ok(())
    }

    /// File position of the frame holding `offset`
    pub fn position(
        &self,
        id: &SegmentIdentity,
        offset: u64,
    ) -> Result<Option<u64>> {
        match self.offset_tree.get(offset_key(&segment_prefix(id), offset))? {
            Some(v) => Ok(Some(safe_vk(&v)?)),
            None => Ok(None),
        }
    }

    /// `(offset, position)` of the highest indexed offset
    pub fn last_indexed(
        &self,
        id: &SegmentIdentity,
    ) -> Result<Option<(u64, u64)>> {
        let prefix = segment_prefix(id);
        match self.offset_tree.scan_prefix(&prefix).next_back() {
            Some(item) => {
                let (k, v) = item?;
                Ok(Some((safe_vk(&k[prefix.len()..])?, safe_vk(&v)?)))
            }
            None => Ok(None),
        }
    }

    /// First indexed offset whose record has `create_time >= timestamp`
    pub fn offset_at_or_after_timestamp(
        &self,
        id: &SegmentIdentity,
        timestamp: u64,
    ) -> Result<Option<u64>> {
        let prefix = segment_prefix(id);
        let mut start = prefix.clone();
        start.extend_from_slice(&safe_kv(timestamp));

        if let Some(item) = self.timestamp_tree.range(start..).next() {
            let (k, _) = item?;
            if k.starts_with(&prefix) && k.len() == prefix.len() + 16 {
                return Ok(Some(safe_vk(&k[k.len() - 8..])?));
            }
        }
        Ok(None)
    }

    /// Offsets carrying `key`, ascending, starting at `from_offset`
    pub fn offsets_by_key(
        &self,
        id: &SegmentIdentity,
        key: &str,
        from_offset: u64,
        limit: usize,
    ) -> Result<Vec<u64>> {
        scan_name(&self.key_tree, &segment_prefix(id), key, from_offset, limit)
    }

    /// Offsets carrying `tag`, ascending, starting at `from_offset`
    pub fn offsets_by_tag(
        &self,
        id: &SegmentIdentity,
        tag: &str,
        from_offset: u64,
        limit: usize,
    ) -> Result<Vec<u64>> {
        scan_name(&self.tag_tree, &segment_prefix(id), tag, from_offset, limit)
    }

    pub fn save_meta(
        &self,
        id: &SegmentIdentity,
        meta: &SegmentMeta,
    ) -> Result<()> {
        let value = bincode::serialize(meta).map_err(StorageError::BincodeError)?;
        self.meta_tree.insert(segment_prefix(id), value)?;
        self.meta_tree.flush()?;
        Ok(())
    }

    pub fn load_meta(
        &self,
        id: &SegmentIdentity,
    ) -> Result<Option<SegmentMeta>> {
        match self.meta_tree.get(segment_prefix(id))? {
            Some(v) => Ok(Some(bincode::deserialize(&v).map_err(StorageError::BincodeError)?)),
            None => Ok(None),
        }
    }

    /// Drops every index entry with offset `>= from_offset`
    pub fn truncate_from(
        &self,
        id: &SegmentIdentity,
        from_offset: u64,
    ) -> Result<()> {
        let prefix = segment_prefix(id);
        for tree in [&self.offset_tree, &self.timestamp_tree, &self.key_tree, &self.tag_tree] {
            let mut batch = Batch::default();
            for item in tree.scan_prefix(&prefix) {
                let (k, _) = item?;
                if safe_vk(&k[k.len() - 8..])? >= from_offset {
                    batch.remove(k);
                }
            }
            tree.apply_batch(batch)?;
        }
        Ok(())
    }

    /// Removes the indices and the meta of a segment
    pub fn remove_segment(
        &self,
        id: &SegmentIdentity,
    ) -> Result<()> {
        let prefix = segment_prefix(id);
        for tree in [&self.offset_tree, &self.timestamp_tree, &self.key_tree, &self.tag_tree] {
            let mut batch = Batch::default();
            for item in tree.scan_prefix(&prefix) {
                let (k, _) = item?;
                batch.remove(k);
            }
            tree.apply_batch(batch)?;
        }
        self.meta_tree.remove(&prefix)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.offset_tree.flush()?;
        Ok(())
    }
}

fn put_name(
    buf: &mut Vec<u8>,
    name: &str,
) {
    buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
}

fn segment_prefix(id: &SegmentIdentity) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(id.namespace.len() + id.shard_name.len() + 12);
    put_name(&mut prefix, &id.namespace);
    put_name(&mut prefix, &id.shard_name);
    prefix.extend_from_slice(&id.segment_no.to_be_bytes());
    prefix
}

fn offset_key(
    prefix: &[u8],
    offset: u64,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&safe_kv(offset));
    key
}

fn name_key(
    prefix: &[u8],
    name: &str,
    offset: u64,
) -> Vec<u8> {
    let mut key = prefix.to_vec();
    put_name(&mut key, name);
    key.extend_from_slice(&safe_kv(offset));
    key
}

fn scan_name(
    tree: &Tree,
    prefix: &[u8],
    name: &str,
    from_offset: u64,
    limit: usize,
) -> Result<Vec<u64>> {
    let mut name_prefix = prefix.to_vec();
    put_name(&mut name_prefix, name);
    let start = name_key(prefix, name, from_offset);

    let mut offsets = Vec::new();
    for item in tree.range(start..) {
        if offsets.len() >= limit {
            break;
        }
        let (k, _) = item?;
        if !k.starts_with(&name_prefix) || k.len() != name_prefix.len() + 8 {
            break;
        }
        offsets.push(safe_vk(&k[name_prefix.len()..])?);
    }
    Ok(offsets)
}
