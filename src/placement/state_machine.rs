use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use super::decode_query;
use super::encode_result;
use super::BrokerNode;
use super::ClusterType;
use super::MetadataCommand;
use super::MetadataQuery;
use super::MetadataResponse;
use super::MetadataResult;
use super::SchemaBind;
use super::SegmentInfo;
use super::SegmentStatus;
use super::ShardInfo;
use super::ShardMeta;
use super::ShardOffset;
use super::ShardStatus;
use crate::raft::StateMachine;
use crate::segment::shard_key;
use crate::segment::validate_shard_name;
use crate::JournalError;
use crate::Result;

type IdempotentKey = (String, String, u64);
/// (namespace, shard_name)
type ShardKey = (String, String);
/// (cluster_name, group, namespace, shard_name)
type OffsetKey = (String, String, String, String);

/// Whole placement state; also the snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementState {
    nodes: BTreeMap<(ClusterType, u64), BrokerNode>,
    resource_configs: BTreeMap<String, Vec<u8>>,
    schemas: BTreeMap<String, Vec<u8>>,
    schema_binds: BTreeSet<SchemaBind>,
    idempotent: BTreeSet<IdempotentKey>,
    offsets: BTreeMap<OffsetKey, u64>,
    shards: BTreeMap<ShardKey, ShardInfo>,
    segments: BTreeMap<(ShardKey, u32), SegmentInfo>,
}

fn resource_key(path: &[String]) -> String {
    path.join("/")
}

fn key_of(
    namespace: &str,
    shard_name: &str,
) -> ShardKey {
    (namespace.to_string(), shard_name.to_string())
}

fn not_found(key: &ShardKey) -> JournalError {
    JournalError::ShardNotFound(shard_key(&key.0, &key.1))
}

impl PlacementState {
    pub fn apply_command(
        &mut self,
        command: MetadataCommand,
    ) -> MetadataResult {
        match command {
            MetadataCommand::RegisterNode(node) => {
                self.nodes.insert((node.cluster_type, node.node_id), node);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::UnregisterNode { cluster_type, node_id } => self
                .nodes
                .remove(&(cluster_type, node_id))
                .map(|_| MetadataResponse::Done)
                .ok_or(JournalError::NodeNotFound(node_id)),
            MetadataCommand::NodeHeartbeat {
                cluster_type,
                node_id,
                time,
            } => {
                let node = self
                    .nodes
                    .get_mut(&(cluster_type, node_id))
                    .ok_or(JournalError::NodeNotFound(node_id))?;
                node.last_heartbeat = node.last_heartbeat.max(time);
                Ok(MetadataResponse::Done)
            }

            MetadataCommand::SetResourceConfig { path, config } => {
                self.resource_configs.insert(resource_key(&path), config);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::DeleteResourceConfig { path } => {
                let key = resource_key(&path);
                self.resource_configs
                    .remove(&key)
                    .map(|_| MetadataResponse::Done)
                    .ok_or(JournalError::ResourceNotFound(key))
            }

            MetadataCommand::CreateSchema { name, schema } => {
                if self.schemas.contains_key(&name) {
                    return Err(JournalError::SchemaAlreadyExists(name));
                }
                self.schemas.insert(name, schema);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::UpdateSchema { name, schema } => match self.schemas.get_mut(&name) {
                Some(existing) => {
                    *existing = schema;
                    Ok(MetadataResponse::Done)
                }
                None => Err(JournalError::SchemaNotFound(name)),
            },
            MetadataCommand::DeleteSchema { name } => {
                if self.schemas.remove(&name).is_none() {
                    return Err(JournalError::SchemaNotFound(name));
                }
                self.schema_binds.retain(|b| b.schema_name != name);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::BindSchema(bind) => {
                if !self.schemas.contains_key(&bind.schema_name) {
                    return Err(JournalError::SchemaNotFound(bind.schema_name));
                }
                self.schema_binds.insert(bind);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::UnbindSchema(bind) => {
                self.schema_binds.remove(&bind);
                Ok(MetadataResponse::Done)
            }

            MetadataCommand::IdempotentSetIfAbsent {
                cluster_name,
                producer_id,
                seq_num,
            } => {
                let inserted = self.idempotent.insert((cluster_name, producer_id, seq_num));
                Ok(MetadataResponse::IdempotentSet { duplicate: !inserted })
            }
            MetadataCommand::IdempotentDelete {
                cluster_name,
                producer_id,
                seq_num,
            } => {
                self.idempotent.remove(&(cluster_name, producer_id, seq_num));
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::SaveOffset {
                cluster_name,
                group,
                namespace,
                shard_name,
                offset,
            } => {
                self.offsets.insert((cluster_name, group, namespace, shard_name), offset);
                Ok(MetadataResponse::Done)
            }

            MetadataCommand::CreateShard { shard, first_segment } => {
                validate_shard_name(&shard.namespace, &shard.shard_name)?;
                let key = key_of(&shard.namespace, &shard.shard_name);
                if self.shards.contains_key(&key) {
                    return Err(JournalError::ShardAlreadyExists(shard_key(&key.0, &key.1)));
                }
                self.segments
                    .insert((key.clone(), first_segment.segment_no), first_segment);
                self.shards.insert(key, shard);
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::DeleteShard { namespace, shard_name } => {
                let key = key_of(&namespace, &shard_name);
                match self.shards.get_mut(&key) {
                    Some(shard) if shard.status == ShardStatus::Run => {
                        shard.status = ShardStatus::PrepareDelete;
                    }
                    _ => return Err(not_found(&key)),
                }
                Ok(MetadataResponse::Shard(self.shard_meta(&key)?))
            }
            MetadataCommand::PurgeShard { namespace, shard_name } => {
                let key = key_of(&namespace, &shard_name);
                if self.shards.remove(&key).is_some() {
                    self.segments.retain(|(shard, _), _| *shard != key);
                    debug!("purged shard {}", shard_key(&namespace, &shard_name));
                }
                Ok(MetadataResponse::Done)
            }
            MetadataCommand::RollSegment {
                namespace,
                shard_name,
                sealed_segment_no,
                end_offset,
                end_timestamp,
                next,
            } => {
                let key = key_of(&namespace, &shard_name);
                let shard = match self.shards.get_mut(&key) {
                    Some(shard) if shard.status == ShardStatus::Run => shard,
                    _ => return Err(not_found(&key)),
                };
                if shard.active_segment != sealed_segment_no || next.segment_no != shard.next_segment_no {
                    return Err(JournalError::SegmentSealed(format!(
                        "{}/{} is not the active segment",
                        shard_key(&namespace, &shard_name),
                        sealed_segment_no
                    )));
                }
                shard.active_segment = next.segment_no;
                shard.next_segment_no = next.segment_no + 1;

                if let Some(sealed) = self.segments.get_mut(&(key.clone(), sealed_segment_no)) {
                    sealed.status = SegmentStatus::SealUp;
                    sealed.end_offset = end_offset;
                    sealed.end_timestamp = end_timestamp;
                }
                self.segments.insert((key, next.segment_no), next.clone());
                Ok(MetadataResponse::Segment(next))
            }
        }
    }

    pub fn query(
        &self,
        query: MetadataQuery,
    ) -> MetadataResult {
        match query {
            MetadataQuery::GetResourceConfig { path } => Ok(MetadataResponse::ResourceConfig(
                self.resource_configs.get(&resource_key(&path)).cloned(),
            )),
            MetadataQuery::ListSchemas { name } => {
                let schemas = self
                    .schemas
                    .iter()
                    .filter(|(n, _)| name.as_ref().map_or(true, |wanted| wanted == *n))
                    .map(|(n, s)| (n.clone(), s.clone()))
                    .collect();
                Ok(MetadataResponse::Schemas(schemas))
            }
            MetadataQuery::ListSchemaBinds { schema_name, resource } => {
                let binds = self
                    .schema_binds
                    .iter()
                    .filter(|b| schema_name.as_ref().map_or(true, |s| *s == b.schema_name))
                    .filter(|b| resource.as_ref().map_or(true, |r| *r == b.resource))
                    .cloned()
                    .collect();
                Ok(MetadataResponse::SchemaBinds(binds))
            }
            MetadataQuery::IdempotentExists {
                cluster_name,
                producer_id,
                seq_num,
            } => Ok(MetadataResponse::Exists(
                self.idempotent.contains(&(cluster_name, producer_id, seq_num)),
            )),
            MetadataQuery::GetOffsets { cluster_name, group } => {
                let offsets = self
                    .offsets
                    .iter()
                    .filter(|((c, g, _, _), _)| *c == cluster_name && *g == group)
                    .map(|((_, _, namespace, shard_name), offset)| ShardOffset {
                        namespace: namespace.clone(),
                        shard_name: shard_name.clone(),
                        offset: *offset,
                    })
                    .collect();
                Ok(MetadataResponse::Offsets(offsets))
            }
            MetadataQuery::ListNodes { cluster_type } => {
                let nodes = self
                    .nodes
                    .values()
                    .filter(|n| cluster_type.map_or(true, |t| t == n.cluster_type))
                    .cloned()
                    .collect();
                Ok(MetadataResponse::Nodes(nodes))
            }
            MetadataQuery::GetShard { namespace, shard_name } => {
                let key = key_of(&namespace, &shard_name);
                match self.shards.get(&key) {
                    Some(shard) if shard.status == ShardStatus::Run => Ok(MetadataResponse::Shard(self.shard_meta(&key)?)),
                    _ => Err(not_found(&key)),
                }
            }
            MetadataQuery::ListShards { namespace } => {
                let mut shards = Vec::new();
                for (key, shard) in &self.shards {
                    if shard.status == ShardStatus::Run && (namespace.is_empty() || shard.namespace == namespace) {
                        shards.push(self.shard_meta(key)?);
                    }
                }
                Ok(MetadataResponse::Shards(shards))
            }
        }
    }

    fn shard_meta(
        &self,
        key: &ShardKey,
    ) -> std::result::Result<ShardMeta, JournalError> {
        let shard = self.shards.get(key).ok_or_else(|| not_found(key))?;
        let segments = self
            .segments
            .range((key.clone(), 0)..=(key.clone(), u32::MAX))
            .map(|(_, segment)| segment.clone())
            .collect();
        Ok(ShardMeta {
            shard: shard.clone(),
            segments,
        })
    }
}

/// Placement center state machine replicated by Raft
#[derive(Debug, Default)]
pub struct PlacementStateMachine {
    state: PlacementState,
}

impl PlacementStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }
}

impl StateMachine for PlacementStateMachine {
    fn apply(
        &mut self,
        index: u64,
        command: &[u8],
    ) -> Result<Vec<u8>> {
        let command: MetadataCommand = bincode::deserialize(command)?;
        trace!("apply {} at index {}", command.name(), index);
        let result = self.state.apply_command(command);
        if let Err(e) = &result {
            debug!("command at index {} rejected: {}", index, e);
        }
        encode_result(&result)
    }

    fn query(
        &self,
        query: &[u8],
    ) -> Result<Vec<u8>> {
        let query = decode_query(query)?;
        encode_result(&self.state.query(query))
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.state)?)
    }

    fn restore(
        &mut self,
        data: &[u8],
    ) -> Result<()> {
        self.state = bincode::deserialize(data)?;
        Ok(())
    }
}
