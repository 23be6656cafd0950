use std::sync::Arc;

use tracing::debug;

use crate::placement::unexpected_response;
use crate::placement::MetadataClient;
use crate::placement::MetadataCommand;
use crate::placement::MetadataQuery;
use crate::placement::MetadataResponse;
use crate::placement::ShardOffset;
use crate::Result;

/// Outcome of [`OffsetTracker::check_and_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyCheck {
    pub duplicate: bool,
}

/// Records `(producer_id, seq_num)` pairs and consumer offsets of one
/// cluster.
pub struct OffsetTracker {
    cluster_name: String,
    metadata: Arc<dyn MetadataClient>,
}

impl OffsetTracker {
    pub fn new(
        cluster_name: impl Into<String>,
        metadata: Arc<dyn MetadataClient>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            metadata,
        }
    }

    /// Atomic test-and-set: one committed command decides on every replica.
    pub async fn check_and_record(
        &self,
        producer_id: &str,
        seq_num: u64,
    ) -> Result<IdempotencyCheck> {
        match self
            .metadata
            .write(MetadataCommand::IdempotentSetIfAbsent {
                cluster_name: self.cluster_name.clone(),
                producer_id: producer_id.to_string(),
                seq_num,
            })
            .await?
        {
            MetadataResponse::IdempotentSet { duplicate } => {
                if duplicate {
                    debug!("duplicate write {}/{} suppressed", producer_id, seq_num);
                }
                Ok(IdempotencyCheck { duplicate })
            }
            other => Err(unexpected_response("IdempotentSetIfAbsent", other)),
        }
    }

    /// Forgets a recorded pair. Deleting an unknown pair is a no-op.
    pub async fn delete(
        &self,
        producer_id: &str,
        seq_num: u64,
    ) -> Result<()> {
        self.metadata
            .write(MetadataCommand::IdempotentDelete {
                cluster_name: self.cluster_name.clone(),
                producer_id: producer_id.to_string(),
                seq_num,
            })
            .await
            .map(|_| ())
    }

    pub async fn exists(
        &self,
        producer_id: &str,
        seq_num: u64,
    ) -> Result<bool> {
        match self
            .metadata
            .read(MetadataQuery::IdempotentExists {
                cluster_name: self.cluster_name.clone(),
                producer_id: producer_id.to_string(),
                seq_num,
            })
            .await?
        {
            MetadataResponse::Exists(exists) => Ok(exists),
            other => Err(unexpected_response("IdempotentExists", other)),
        }
    }

    /// Last writer wins per `(group, namespace, shard_name)`.
    pub async fn save_offset(
        &self,
        group: &str,
        namespace: &str,
        shard_name: &str,
        offset: u64,
    ) -> Result<()> {
        self.metadata
            .write(MetadataCommand::SaveOffset {
                cluster_name: self.cluster_name.clone(),
                group: group.to_string(),
                namespace: namespace.to_string(),
                shard_name: shard_name.to_string(),
                offset,
            })
            .await
            .map(|_| ())
    }

    pub async fn get_offset(
        &self,
        group: &str,
    ) -> Result<Vec<ShardOffset>> {
        match self
            .metadata
            .read(MetadataQuery::GetOffsets {
                cluster_name: self.cluster_name.clone(),
                group: group.to_string(),
            })
            .await?
        {
            MetadataResponse::Offsets(offsets) => Ok(offsets),
            other => Err(unexpected_response("GetOffsets", other)),
        }
    }

    /// Offset of one shard for `group`, if the group ever committed one.
    pub async fn shard_offset(
        &self,
        group: &str,
        namespace: &str,
        shard_name: &str,
    ) -> Result<Option<u64>> {
        Ok(self
            .get_offset(group)
            .await?
            .into_iter()
            .find(|o| o.namespace == namespace && o.shard_name == shard_name)
            .map(|o| o.offset))
    }
}
