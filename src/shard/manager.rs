use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::convert::stable_hash;
use crate::placement::unexpected_response;
use crate::placement::ClusterType;
use crate::placement::MetadataClient;
use crate::placement::MetadataCommand;
use crate::placement::MetadataQuery;
use crate::placement::MetadataResponse;
use crate::placement::SegmentInfo;
use crate::placement::SegmentStatus;
use crate::placement::ShardInfo;
use crate::placement::ShardMeta;
use crate::placement::ShardStatus;
use crate::segment::shard_key;
use crate::segment::validate_shard_name;
use crate::segment::Segment;
use crate::segment::SegmentIdentity;
use crate::segment::SegmentStore;
use crate::time::timestamp_millis;
use crate::JournalError;
use crate::Result;
use crate::SHARD_ROLLOVERS;

/// Picks `replica_num` of `nodes`: sorted by id, rotated by a stable hash of
/// the shard key. The first replica leads.
pub fn choose_replicas(
    shard_key: &str,
    mut nodes: Vec<u64>,
    replica_num: u32,
) -> Result<Vec<u64>> {
    nodes.sort_unstable();
    nodes.dedup();
    let required = replica_num.max(1);
    if (nodes.len() as u32) < required {
        return Err(JournalError::InsufficientReplicas {
            required,
            available: nodes.len() as u32,
        }
        .into());
    }
    let start = (stable_hash(shard_key) % nodes.len() as u64) as usize;
    nodes.rotate_left(start);
    nodes.truncate(required as usize);
    Ok(nodes)
}

pub struct ShardManager {
    node_id: u64,
    store: Arc<SegmentStore>,
    metadata: Arc<dyn MetadataClient>,
    /// Serializes rollovers per shard key
    roll_locks: DashMap<String, Arc<Mutex<()>>>,
    gc_delay: Duration,
}

impl ShardManager {
    pub fn new(
        node_id: u64,
        store: Arc<SegmentStore>,
        metadata: Arc<dyn MetadataClient>,
        gc_delay: Duration,
    ) -> Self {
        Self {
            node_id,
            store,
            metadata,
            roll_locks: DashMap::new(),
            gc_delay,
        }
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    /// Creates the shard with its first segment (number 0).
    pub async fn create_shard(
        &self,
        namespace: &str,
        shard_name: &str,
        replica_num: u32,
    ) -> Result<ShardMeta> {
        validate_shard_name(namespace, shard_name)?;
        let key = shard_key(namespace, shard_name);
        let nodes = match self
            .metadata
            .read(MetadataQuery::ListNodes {
                cluster_type: Some(ClusterType::JournalServer),
            })
            .await?
        {
            MetadataResponse::Nodes(nodes) => nodes.into_iter().map(|n| n.node_id).collect(),
            other => return Err(unexpected_response("ListNodes", other)),
        };
        let replicas = choose_replicas(&key, nodes, replica_num)?;
        let now = timestamp_millis();

        let shard = ShardInfo {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            replica_num: replica_num.max(1),
            replicas: replicas.clone(),
            active_segment: 0,
            next_segment_no: 1,
            status: ShardStatus::Run,
            create_time: now,
        };
        let first_segment = SegmentInfo {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            segment_no: 0,
            leader: replicas[0],
            replicas,
            start_offset: 0,
            end_offset: 0,
            start_timestamp: now,
            end_timestamp: 0,
            status: SegmentStatus::Write,
        };
        self.metadata
            .write(MetadataCommand::CreateShard {
                shard: shard.clone(),
                first_segment: first_segment.clone(),
            })
            .await?;

        if first_segment.leader == self.node_id {
            self.store
                .open_segment(&SegmentIdentity::new(namespace, shard_name, 0), 0)?;
        }
        info!("shard {} created on replicas {:?}", key, shard.replicas);
        Ok(ShardMeta {
            shard,
            segments: vec![first_segment],
        })
    }

    /// Tombstones the shard and schedules removal of its data.
    pub async fn delete_shard(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Result<JoinHandle<()>> {
        let meta = match self
            .metadata
            .write(MetadataCommand::DeleteShard {
                namespace: namespace.to_string(),
                shard_name: shard_name.to_string(),
            })
            .await?
        {
            MetadataResponse::Shard(meta) => meta,
            other => return Err(unexpected_response("DeleteShard", other)),
        };
        let key = shard_key(namespace, shard_name);
        self.roll_locks.remove(&key);
        for segment in &meta.segments {
            // Fence further appends before the data goes away
            if let Some(handle) = self
                .store
                .close(&SegmentIdentity::new(namespace, shard_name, segment.segment_no))
            {
                if let Err(e) = handle.seal() {
                    warn!("sealing {} before delete failed: {:?}", handle.identity(), e);
                }
            }
        }
        info!("shard {} marked for deletion", key);

        let store = self.store.clone();
        let metadata = self.metadata.clone();
        let gc_delay = self.gc_delay;
        let namespace = namespace.to_string();
        let shard_name = shard_name.to_string();
        let segment_nos: Vec<u32> = meta.segments.iter().map(|s| s.segment_no).collect();
        Ok(tokio::spawn(async move {
            tokio::time::sleep(gc_delay).await;
            if let Err(e) = store.delete_shard_data(&namespace, &shard_name, &segment_nos) {
                error!("deleting data of shard {}/{} failed: {:?}", namespace, shard_name, e);
                return;
            }
            match metadata
                .write(MetadataCommand::PurgeShard {
                    namespace: namespace.clone(),
                    shard_name: shard_name.clone(),
                })
                .await
            {
                Ok(_) => info!("shard {}/{} purged", namespace, shard_name),
                Err(e) => error!("purging shard {}/{} failed: {:?}", namespace, shard_name, e),
            }
        }))
    }

    /// Seals the active segment and opens its successor.
    pub async fn roll_segment(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Result<u32> {
        self.roll(namespace, shard_name, None).await
    }

    /// Rolls only while `segment_no` is still active; otherwise returns the
    /// segment that replaced it.
    pub async fn roll_segment_if_active(
        &self,
        namespace: &str,
        shard_name: &str,
        segment_no: u32,
    ) -> Result<u32> {
        self.roll(namespace, shard_name, Some(segment_no)).await
    }

    async fn roll(
        &self,
        namespace: &str,
        shard_name: &str,
        expected_active: Option<u32>,
    ) -> Result<u32> {
        let key = shard_key(namespace, shard_name);
        let lock = self
            .roll_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let meta = self.committed_shard(namespace, shard_name).await?;
        let active_no = meta.shard.active_segment;
        if let Some(expected) = expected_active {
            if expected != active_no {
                debug!("{}/{} already rolled to {}", key, expected, active_no);
                return Ok(active_no);
            }
        }
        let active_info = meta
            .active()
            .ok_or_else(|| JournalError::SegmentNotFound(format!("{}/{}", key, active_no)))?;

        // Only the leader holds the records, so only it knows the end offset
        let active = self.local_segment(active_info).await?;
        let end_offset = active.seal()?;
        let end_timestamp = active.offsets().end_timestamp;

        let next = SegmentInfo {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            segment_no: meta.shard.next_segment_no,
            leader: meta.shard.replicas.first().copied().unwrap_or(self.node_id),
            replicas: meta.shard.replicas.clone(),
            start_offset: end_offset,
            end_offset,
            start_timestamp: timestamp_millis(),
            end_timestamp: 0,
            status: SegmentStatus::Write,
        };
        let next = match self
            .metadata
            .write(MetadataCommand::RollSegment {
                namespace: namespace.to_string(),
                shard_name: shard_name.to_string(),
                sealed_segment_no: active_no,
                end_offset,
                end_timestamp,
                next,
            })
            .await?
        {
            MetadataResponse::Segment(next) => next,
            other => return Err(unexpected_response("RollSegment", other)),
        };
        if next.leader == self.node_id {
            self.open_local(&next)?;
        }
        SHARD_ROLLOVERS.inc();
        info!(
            "shard {} rolled: segment {} sealed at {}, segment {} active",
            key, active_no, end_offset, next.segment_no
        );
        Ok(next.segment_no)
    }

    /// Committed shard metadata with offset fields of local segments filled
    /// in from the segment store.
    pub async fn get_shard_metadata(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Result<ShardMeta> {
        let mut meta = self.committed_shard(namespace, shard_name).await?;
        self.overlay_local_offsets(&mut meta);
        Ok(meta)
    }

    /// Every live shard of `namespace`, or of all namespaces when empty.
    pub async fn list_shards(
        &self,
        namespace: &str,
    ) -> Result<Vec<ShardMeta>> {
        let mut shards = match self
            .metadata
            .read(MetadataQuery::ListShards {
                namespace: namespace.to_string(),
            })
            .await?
        {
            MetadataResponse::Shards(shards) => shards,
            other => return Err(unexpected_response("ListShards", other)),
        };
        for meta in &mut shards {
            self.overlay_local_offsets(meta);
        }
        Ok(shards)
    }

    /// Local handle of a segment this node leads.
    ///
    /// Always resolved against the committed metadata: a segment led by
    /// another node, or one of a deleted shard, is never served from a stale
    /// local handle.
    ///
    /// # Errors
    /// - [`JournalError::NotSegmentLeader`] with the leader's journal address
    /// - [`JournalError::SegmentNotFound`], [`JournalError::ShardNotFound`]
    pub async fn segment(
        &self,
        namespace: &str,
        shard_name: &str,
        segment_no: u32,
    ) -> Result<Arc<Segment>> {
        let meta = self.committed_shard(namespace, shard_name).await?;
        let info = meta.segments.iter().find(|s| s.segment_no == segment_no).ok_or_else(|| {
            JournalError::SegmentNotFound(SegmentIdentity::new(namespace, shard_name, segment_no).to_string())
        })?;
        self.local_segment(info).await
    }

    /// First offset still stored and end offset of the shard.
    pub async fn offset_bounds(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Result<(u64, u64)> {
        let meta = self.get_shard_metadata(namespace, shard_name).await?;
        let earliest = meta.segments.first().map(|s| s.start_offset).unwrap_or(0);
        let latest = meta.active().map(|s| s.end_offset).unwrap_or(earliest);
        Ok((earliest, latest))
    }

    /// First offset of the shard whose record was created at or after
    /// `timestamp`; the shard end offset when every record is older.
    pub async fn offset_for_timestamp(
        &self,
        namespace: &str,
        shard_name: &str,
        timestamp: u64,
    ) -> Result<u64> {
        let meta = self.committed_shard(namespace, shard_name).await?;
        let mut end = 0;
        for info in &meta.segments {
            if info.status == SegmentStatus::SealUp && info.end_timestamp < timestamp {
                end = info.end_offset;
                continue;
            }
            let segment = self.local_segment(info).await?;
            let offset = segment.offset_for_timestamp(timestamp)?;
            end = segment.end_offset();
            if offset < end {
                return Ok(offset);
            }
        }
        Ok(end)
    }

    async fn committed_shard(
        &self,
        namespace: &str,
        shard_name: &str,
    ) -> Result<ShardMeta> {
        match self
            .metadata
            .read(MetadataQuery::GetShard {
                namespace: namespace.to_string(),
                shard_name: shard_name.to_string(),
            })
            .await?
        {
            MetadataResponse::Shard(meta) => Ok(meta),
            other => Err(unexpected_response("GetShard", other)),
        }
    }

    async fn local_segment(
        &self,
        info: &SegmentInfo,
    ) -> Result<Arc<Segment>> {
        if info.leader != self.node_id {
            return Err(self.not_segment_leader(info).await);
        }
        self.open_local(info)
    }

    async fn not_segment_leader(
        &self,
        info: &SegmentInfo,
    ) -> crate::Error {
        let leader_addr = match self
            .metadata
            .read(MetadataQuery::ListNodes {
                cluster_type: Some(ClusterType::JournalServer),
            })
            .await
        {
            Ok(MetadataResponse::Nodes(nodes)) => nodes
                .into_iter()
                .find(|n| n.node_id == info.leader)
                .map(|n| n.address),
            _ => None,
        };
        JournalError::NotSegmentLeader {
            segment: SegmentIdentity::new(&info.namespace, &info.shard_name, info.segment_no).to_string(),
            leader_id: info.leader,
            leader_addr,
        }
        .into()
    }

    fn open_local(
        &self,
        info: &SegmentInfo,
    ) -> Result<Arc<Segment>> {
        let identity = SegmentIdentity::new(&info.namespace, &info.shard_name, info.segment_no);
        let segment = self.store.open_segment(&identity, info.start_offset)?;
        if info.status == SegmentStatus::SealUp && !segment.is_sealed() {
            segment.seal()?;
        }
        Ok(segment)
    }

    fn overlay_local_offsets(
        &self,
        meta: &mut ShardMeta,
    ) {
        for info in &mut meta.segments {
            let identity = SegmentIdentity::new(&info.namespace, &info.shard_name, info.segment_no);
            if let Some(segment) = self.store.get(&identity) {
                let offsets = segment.offsets();
                if info.status == SegmentStatus::Write {
                    info.end_offset = offsets.end_offset;
                    info.end_timestamp = offsets.end_timestamp;
                }
                if offsets.start_timestamp > 0 {
                    info.start_timestamp = offsets.start_timestamp;
                }
            }
        }
    }
}
