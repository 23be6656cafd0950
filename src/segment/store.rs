use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::info;

use super::shard_dir;
use super::Segment;
use super::SegmentConfig;
use super::SegmentFile;
use super::SegmentIdentity;
use super::SegmentIndex;
use crate::file_io::create_dir_if_not_exist;
use crate::file_io::remove_dir_if_exist;
use crate::storage::init_sled_index_db;
use crate::Result;

/// Registry of the segments hosted on this node.
///
/// Owns the shared index database and hands out one [`Segment`] handle per
/// identity.
pub struct SegmentStore {
    data_dir: PathBuf,
    config: SegmentConfig,
    index: Arc<SegmentIndex>,
    segments: DashMap<SegmentIdentity, Arc<Segment>>,
}

impl SegmentStore {
    pub fn open(
        data_dir: &Path,
        config: SegmentConfig,
    ) -> Result<Self> {
        create_dir_if_not_exist(data_dir)?;
        let db = init_sled_index_db(data_dir)?;
        let index = Arc::new(SegmentIndex::open(&db)?);
        info!("segment store opened at {:?}", data_dir);
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            index,
            segments: DashMap::new(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> SegmentConfig {
        self.config
    }

    /// Returns the open handle, opening (and recovering) the segment first
    /// when needed.
    pub fn open_segment(
        &self,
        identity: &SegmentIdentity,
        start_offset: u64,
    ) -> Result<Arc<Segment>> {
        if let Some(segment) = self.get(identity) {
            return Ok(segment);
        }
        let entry = self.segments.entry(identity.clone()).or_try_insert_with(|| {
            Segment::open(
                identity.clone(),
                &self.data_dir,
                self.config,
                self.index.clone(),
                start_offset,
            )
            .map(Arc::new)
        })?;
        Ok(entry.value().clone())
    }

    pub fn get(
        &self,
        identity: &SegmentIdentity,
    ) -> Option<Arc<Segment>> {
        self.segments.get(identity).map(|s| s.value().clone())
    }

    /// Open segments of one shard, ordered by segment number
    pub fn segments_of_shard(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Vec<Arc<Segment>> {
        let mut segments: Vec<Arc<Segment>> = self
            .segments
            .iter()
            .filter(|e| e.key().namespace == namespace && e.key().shard_name == shard_name)
            .map(|e| e.value().clone())
            .collect();
        segments.sort_by_key(|s| s.identity().segment_no);
        segments
    }

    /// Drops the handle without touching data
    pub fn close(
        &self,
        identity: &SegmentIdentity,
    ) -> Option<Arc<Segment>> {
        self.segments.remove(identity).map(|(_, s)| s)
    }

    /// Removes file and indices of one segment, open or not.
    pub fn delete_segment(
        &self,
        identity: &SegmentIdentity,
    ) -> Result<()> {
        match self.close(identity) {
            Some(segment) => segment.delete(&self.data_dir),
            None => {
                SegmentFile::remove(&identity.file_path(&self.data_dir))?;
                self.index.remove_segment(identity)
            }
        }
    }

    /// Removes every listed segment and then the shard directory.
    pub fn delete_shard_data(
        &self,
        namespace: &str,
        shard_name: &str,
        segment_nos: &[u32],
    ) -> Result<()> {
        for segment_no in segment_nos {
            self.delete_segment(&SegmentIdentity::new(namespace, shard_name, *segment_no))?;
        }
        // Handles opened for segments unknown to the caller
        for segment in self.segments_of_shard(namespace, shard_name) {
            self.delete_segment(segment.identity())?;
        }
        remove_dir_if_exist(&shard_dir(&self.data_dir, namespace, shard_name))?;
        debug!("deleted data of shard {}/{}", namespace, shard_name);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.index.flush()
    }
}
