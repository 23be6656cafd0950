use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::JournalError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ClusterType {
    PlacementCenter,
    JournalServer,
    MqttBrokerServer,
    AmqpBrokerServer,
}

/// A process registered with the placement center
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerNode {
    pub node_id: u64,
    pub address: String,
    pub cluster_type: ClusterType,
    pub register_time: u64,
    pub last_heartbeat: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    Run,
    /// Tombstoned; segment data is being garbage collected
    PrepareDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    Write,
    SealUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub namespace: String,
    pub shard_name: String,
    pub replica_num: u32,
    pub replicas: Vec<u64>,
    pub active_segment: u32,
    /// Never reused, even after segments are purged
    pub next_segment_no: u32,
    pub status: ShardStatus,
    pub create_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub namespace: String,
    pub shard_name: String,
    pub segment_no: u32,
    pub leader: u64,
    pub replicas: Vec<u64>,
    pub start_offset: u64,
    /// Exclusive; only authoritative once the segment is sealed
    pub end_offset: u64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub status: SegmentStatus,
}

/// A shard with its segment chain in segment number order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMeta {
    pub shard: ShardInfo,
    pub segments: Vec<SegmentInfo>,
}

impl ShardMeta {
    pub fn active(&self) -> Option<&SegmentInfo> {
        self.segments
            .iter()
            .find(|s| s.segment_no == self.shard.active_segment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaBind {
    pub schema_name: String,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardOffset {
    pub namespace: String,
    pub shard_name: String,
    pub offset: u64,
}

/// Mutations of the placement state. Every time value is carried inside the
/// command so that replicas apply identical transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataCommand {
    RegisterNode(BrokerNode),
    UnregisterNode {
        cluster_type: ClusterType,
        node_id: u64,
    },
    NodeHeartbeat {
        cluster_type: ClusterType,
        node_id: u64,
        time: u64,
    },

    SetResourceConfig {
        path: Vec<String>,
        config: Vec<u8>,
    },
    DeleteResourceConfig {
        path: Vec<String>,
    },

    CreateSchema {
        name: String,
        schema: Vec<u8>,
    },
    UpdateSchema {
        name: String,
        schema: Vec<u8>,
    },
    DeleteSchema {
        name: String,
    },
    BindSchema(SchemaBind),
    UnbindSchema(SchemaBind),

    IdempotentSetIfAbsent {
        cluster_name: String,
        producer_id: String,
        seq_num: u64,
    },
    IdempotentDelete {
        cluster_name: String,
        producer_id: String,
        seq_num: u64,
    },
    SaveOffset {
        cluster_name: String,
        group: String,
        namespace: String,
        shard_name: String,
        offset: u64,
    },

    CreateShard {
        shard: ShardInfo,
        first_segment: SegmentInfo,
    },
    DeleteShard {
        namespace: String,
        shard_name: String,
    },
    PurgeShard {
        namespace: String,
        shard_name: String,
    },
    /// Seals `sealed_segment_no` and makes `next` the active segment
    RollSegment {
        namespace: String,
        shard_name: String,
        sealed_segment_no: u32,
        end_offset: u64,
        end_timestamp: u64,
        next: SegmentInfo,
    },
}

impl MetadataCommand {
    pub fn name(&self) -> &'static str {
        match self {
            MetadataCommand::RegisterNode(_) => "RegisterNode",
            MetadataCommand::UnregisterNode { .. } => "UnregisterNode",
            MetadataCommand::NodeHeartbeat { .. } => "NodeHeartbeat",
            MetadataCommand::SetResourceConfig { .. } => "SetResourceConfig",
            MetadataCommand::DeleteResourceConfig { .. } => "DeleteResourceConfig",
            MetadataCommand::CreateSchema { .. } => "CreateSchema",
            MetadataCommand::UpdateSchema { .. } => "UpdateSchema",
            MetadataCommand::DeleteSchema { .. } => "DeleteSchema",
            MetadataCommand::BindSchema(_) => "BindSchema",
            MetadataCommand::UnbindSchema(_) => "UnbindSchema",
            MetadataCommand::IdempotentSetIfAbsent { .. } => "IdempotentSetIfAbsent",
            MetadataCommand::IdempotentDelete { .. } => "IdempotentDelete",
            MetadataCommand::SaveOffset { .. } => "SaveOffset",
            MetadataCommand::CreateShard { .. } => "CreateShard",
            MetadataCommand::DeleteShard { .. } => "DeleteShard",
            MetadataCommand::PurgeShard { .. } => "PurgeShard",
            MetadataCommand::RollSegment { .. } => "RollSegment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataQuery {
    GetResourceConfig {
        path: Vec<String>,
    },
    /// All schemas when `name` is `None`
    ListSchemas {
        name: Option<String>,
    },
    ListSchemaBinds {
        schema_name: Option<String>,
        resource: Option<String>,
    },
    IdempotentExists {
        cluster_name: String,
        producer_id: String,
        seq_num: u64,
    },
    GetOffsets {
        cluster_name: String,
        group: String,
    },
    ListNodes {
        cluster_type: Option<ClusterType>,
    },
    GetShard {
        namespace: String,
        shard_name: String,
    },
    /// Every shard when `namespace` is empty
    ListShards {
        namespace: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataResponse {
    Done,
    IdempotentSet { duplicate: bool },
    ResourceConfig(Option<Vec<u8>>),
    Schemas(Vec<(String, Vec<u8>)>),
    SchemaBinds(Vec<SchemaBind>),
    Exists(bool),
    Offsets(Vec<ShardOffset>),
    Nodes(Vec<BrokerNode>),
    Shard(ShardMeta),
    Shards(Vec<ShardMeta>),
    Segment(SegmentInfo),
}

/// Payload returned by the state machine for commands and queries
pub type MetadataResult = std::result::Result<MetadataResponse, JournalError>;

pub(crate) fn encode_result(result: &MetadataResult) -> Result<Vec<u8>> {
    Ok(bincode::serialize(result)?)
}

pub(crate) fn decode_result(bytes: &[u8]) -> Result<MetadataResponse> {
    let result: MetadataResult = bincode::deserialize(bytes)?;
    result.map_err(Error::from)
}

pub(crate) fn unexpected_response(
    operation: &str,
    response: MetadataResponse,
) -> Error {
    Error::Fatal(format!("{} answered with unexpected {:?}", operation, response))
}

pub(crate) fn decode_query(bytes: &[u8]) -> Result<MetadataQuery> {
    Ok(bincode::deserialize(bytes)?)
}
