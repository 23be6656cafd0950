//! Journal Engine Error Hierarchy
//!
//! Errors are grouped by layer: infrastructure (network, storage,
//! serialization), configuration, Raft consensus and the journal domain.
//! Domain errors ([`JournalError`]) are the ones that travel in-band to
//! clients through `RespHeader.error`, so they are plain data (serde) and can
//! also be produced by the replicated placement state machine.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, storage, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Raft consensus failures and redirects
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Journal domain failures reported to clients in-band
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Peer communication timeout
    #[error("Connection timeout to {node_id} after {duration:?}")]
    Timeout { node_id: u64, duration: Duration },

    /// Socket could not be established
    #[error("Connect to {addr} failed: {source}")]
    ConnectError {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Retry policy exhaustion
    #[error("Retry timeout after {0:?}")]
    RetryTimeoutError(Duration),

    #[error("{0}")]
    TaskBackoffFailed(String),

    /// Remote end closed the connection before answering
    #[error("Connection closed by {0}")]
    ConnectionClosed(String),

    /// Frame exceeds the configured maximum
    #[error("Payload size limit exceeded: {0} bytes")]
    PayloadSizeLimitExceeded(usize),

    /// Malformed frame on the wire
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Remote peer answered with an unexpected message kind
    #[error("Unexpected response for {request_type}")]
    UnexpectedResponse { request_type: &'static str },

    /// Peer failed to serve the request
    #[error("Remote peer failed: {0}")]
    Remote(String),

    #[error("Socket io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during segment/log/snapshot operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization failures for persisted data
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    /// Checksum validation failures
    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },

    /// A single record frame larger than the segment format allows
    #[error("Record of {size} bytes exceeds frame limit {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Value convert failed")]
    Convert(#[from] ConvertError),
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Input byte slice length doesn't match the required 8 bytes.
    #[error("invalid byte length: expected 8 bytes, received {0} bytes")]
    InvalidLength(usize),
}

// Serialization is classified separately (across protocol layers and system layers)
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Protobuf decode failed: {0}")]
    ProstDecode(#[from] prost::DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// Request reached a node that is not the leader
    #[error("Not leader (leader: {leader_id:?} at {leader_addr:?})")]
    NotLeader {
        leader_id: Option<u64>,
        leader_addr: Option<String>,
    },

    /// Proposal was not committed within the caller supplied deadline
    #[error("Raft operation timed out after {0:?}")]
    Timeout(Duration),

    /// Raft core stopped and no longer accepts requests
    #[error("Raft core is shut down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Log inconsistency detected during replication (§5.3)
    #[error("Log conflict at index {index} (expected term {expected_term}, actual {actual_term})")]
    LogConflict {
        index: u64,
        expected_term: u64,
        actual_term: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// Only a single voter may be added or removed per change
    #[error("Membership change must add or remove exactly one voter: {0}")]
    UnsafeChange(String),

    /// A configuration change is already in flight
    #[error("Another membership change is in progress")]
    ChangeInProgress,

    /// Missing node metadata in configuration
    #[error("Metadata missing for node {node_id} in cluster config")]
    NoMetadataFoundForNode { node_id: u64 },
}

/// Domain errors of the journal engine.
///
/// Every variant maps onto one code of the wire error taxonomy via
/// [`JournalError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum JournalError {
    #[error("Unsupported api_key {api_key} with api_version {api_version}")]
    UnimplementedApi { api_key: i32, api_version: i32 },

    #[error("Request body of {0} is empty")]
    RequestBodyEmpty(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Shard {0} not found")]
    ShardNotFound(String),

    #[error("Shard {0} already exists")]
    ShardAlreadyExists(String),

    #[error("Invalid shard name: {0}")]
    InvalidShardName(String),

    #[error("Segment {0} not found")]
    SegmentNotFound(String),

    /// Only the segment leader stores and serves a segment's records
    #[error("Segment {segment} is led by node {leader_id} at {leader_addr:?}")]
    NotSegmentLeader {
        segment: String,
        leader_id: u64,
        leader_addr: Option<String>,
    },

    #[error("Segment {0} is sealed")]
    SegmentSealed(String),

    #[error("Segment {0} is full")]
    SegmentFull(String),

    #[error("Invalid read filter: {0}")]
    InvalidFilter(String),

    #[error("Insufficient replicas: required {required}, available {available}")]
    InsufficientReplicas { required: u32, available: u32 },

    #[error("Schema {0} not found")]
    SchemaNotFound(String),

    #[error("Schema {0} already exists")]
    SchemaAlreadyExists(String),

    #[error("Resource {0} not found")]
    ResourceNotFound(String),

    #[error("Node {0} not found")]
    NodeNotFound(u64),

    #[error("Io failure: {0}")]
    IoFailure(String),
}

impl JournalError {
    /// Wire error code carried in `RespHeader.error.code`
    pub fn code(&self) -> &'static str {
        match self {
            JournalError::UnimplementedApi { .. } => "UnimplementedApi",
            JournalError::RequestBodyEmpty(_) => "RequestBodyEmpty",
            JournalError::MalformedRequest(_) => "MalformedRequest",
            JournalError::ShardNotFound(_) => "ShardNotFound",
            JournalError::ShardAlreadyExists(_) => "ShardAlreadyExists",
            JournalError::InvalidShardName(_) => "InvalidShardName",
            JournalError::SegmentNotFound(_) => "SegmentNotFound",
            JournalError::NotSegmentLeader { .. } => "NotLeader",
            JournalError::SegmentSealed(_) => "SegmentSealed",
            JournalError::SegmentFull(_) => "SegmentFull",
            JournalError::InvalidFilter(_) => "InvalidFilter",
            JournalError::InsufficientReplicas { .. } => "InsufficientReplicas",
            JournalError::SchemaNotFound(_) => "SchemaNotFound",
            JournalError::SchemaAlreadyExists(_) => "SchemaAlreadyExists",
            JournalError::ResourceNotFound(_) => "ResourceNotFound",
            JournalError::NodeNotFound(_) => "NodeNotFound",
            JournalError::IoFailure(_) => "IoFailure",
        }
    }
}

impl Error {
    /// Maps any error onto the wire error taxonomy.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::Journal(e) => e.code(),
            Error::Consensus(ConsensusError::NotLeader { .. }) => "NotLeader",
            Error::Consensus(ConsensusError::Timeout(_)) => "Timeout",
            Error::System(SystemError::Network(NetworkError::Timeout { .. }))
            | Error::System(SystemError::Network(NetworkError::RetryTimeoutError(_))) => "Timeout",
            Error::System(SystemError::Storage(_)) => "IoFailure",
            _ => "InternalError",
        }
    }

    /// Durability-layer faults that a caller may retry locally.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Storage(
                StorageError::IoError(_) | StorageError::PathError { .. } | StorageError::DbError(_)
            )) | Error::Journal(JournalError::IoFailure(_))
        )
    }

    pub fn as_journal(&self) -> Option<&JournalError> {
        match self {
            Error::Journal(e) => Some(e),
            _ => None,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Error::System(SystemError::Network(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<ConvertError> for Error {
    fn from(e: ConvertError) -> Self {
        Error::System(SystemError::Storage(StorageError::Convert(e)))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<ReplicationError> for Error {
    fn from(e: ReplicationError) -> Self {
        Error::Consensus(ConsensusError::Replication(e))
    }
}

impl From<MembershipError> for Error {
    fn from(e: MembershipError) -> Self {
        Error::Consensus(ConsensusError::Membership(e))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        SerializationError::Bincode(err).into()
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        SerializationError::ProstDecode(err).into()
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        NetworkError::TaskFailed(err).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err).into()
    }
}
