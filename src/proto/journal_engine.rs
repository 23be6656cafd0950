//! Journal engine wire messages.
//!
//! Every request is `{header: ReqHeader, body: <Api>ReqBody}` and every
//! response is `{header: RespHeader, body: <Api>RespBody}`. Errors travel
//! in-band through `RespHeader.error` or per-item `error` fields.

/// Request header
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReqHeader {
    #[prost(enumeration = "ApiKey", tag = "1")]
    pub api_key: i32,
    #[prost(enumeration = "ApiVersion", tag = "2")]
    pub api_version: i32,
}

/// Response header
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RespHeader {
    #[prost(enumeration = "ApiKey", tag = "1")]
    pub api_key: i32,
    #[prost(enumeration = "ApiVersion", tag = "2")]
    pub api_version: i32,
    #[prost(message, optional, tag = "3")]
    pub error: ::core::option::Option<JournalEngineError>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct JournalEngineError {
    #[prost(string, tag = "1")]
    pub code: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
}

// ---------------------------------------------------------------- Write

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<WriteReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteReqBody {
    #[prost(message, repeated, tag = "1")]
    pub data: ::prost::alloc::vec::Vec<WriteReqSegmentMessages>,
    /// Non-empty enables idempotent-producer deduplication on `pkid`
    #[prost(string, tag = "2")]
    pub producer_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteReqSegmentMessages {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub segment: u32,
    #[prost(message, repeated, tag = "4")]
    pub messages: ::prost::alloc::vec::Vec<WriteReqMessages>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteReqMessages {
    #[prost(uint64, tag = "1")]
    pub pkid: u64,
    #[prost(string, tag = "2")]
    pub key: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, repeated, tag = "4")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<WriteRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRespBody {
    #[prost(message, repeated, tag = "1")]
    pub status: ::prost::alloc::vec::Vec<WriteRespMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRespMessage {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub segment: u32,
    #[prost(message, repeated, tag = "4")]
    pub messages: ::prost::alloc::vec::Vec<WriteRespMessageStatus>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteRespMessageStatus {
    #[prost(uint64, tag = "1")]
    pub pkid: u64,
    #[prost(uint64, tag = "2")]
    pub offset: u64,
    #[prost(message, optional, tag = "3")]
    pub error: ::core::option::Option<JournalEngineError>,
    /// Set when the record was suppressed as an idempotent duplicate
    #[prost(bool, tag = "4")]
    pub duplicate: bool,
}

// ---------------------------------------------------------------- Read

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<ReadReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadReqBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<ReadReqMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadReqMessage {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub segment: u32,
    #[prost(enumeration = "ReadType", tag = "4")]
    pub read_type: i32,
    #[prost(message, optional, tag = "5")]
    pub filter: ::core::option::Option<ReadReqFilter>,
    #[prost(message, optional, tag = "6")]
    pub options: ::core::option::Option<ReadReqOptions>,
}

/// Field presence matters: the read type names the field that must be set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadReqFilter {
    #[prost(uint64, optional, tag = "1")]
    pub offset: ::core::option::Option<u64>,
    #[prost(string, optional, tag = "2")]
    pub key: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "3")]
    pub tag: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(uint64, optional, tag = "4")]
    pub timestamp: ::core::option::Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadReqOptions {
    #[prost(uint64, tag = "1")]
    pub max_size: u64,
    #[prost(uint64, tag = "2")]
    pub max_record: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<ReadRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRespBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<ReadRespSegmentMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRespSegmentMessage {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub segment: u32,
    #[prost(message, repeated, tag = "4")]
    pub messages: ::prost::alloc::vec::Vec<ReadRespMessage>,
    #[prost(message, optional, tag = "5")]
    pub error: ::core::option::Option<JournalEngineError>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRespMessage {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(string, tag = "2")]
    pub key: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, repeated, tag = "4")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(uint64, tag = "5")]
    pub timestamp: u64,
}

// ---------------------------------------------------------------- CreateShard

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateShardReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<CreateShardReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateShardReqBody {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub replica_num: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateShardResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<CreateShardRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateShardRespBody {
    #[prost(uint64, repeated, tag = "1")]
    pub replica: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint32, tag = "2")]
    pub segment_no: u32,
}

// ---------------------------------------------------------------- DeleteShard

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<DeleteShardReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardReqBody {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<DeleteShardRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardRespBody {}

// ---------------------------------------------------------------- GetShardMetadata

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<GetShardMetadataReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataReqBody {
    #[prost(message, repeated, tag = "1")]
    pub shards: ::prost::alloc::vec::Vec<GetShardMetadataReqShard>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataReqShard {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<GetShardMetadataRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataRespBody {
    #[prost(message, repeated, tag = "1")]
    pub shards: ::prost::alloc::vec::Vec<GetShardMetadataRespShard>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetShardMetadataRespShard {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub active_segment: u32,
    #[prost(uint64, tag = "4")]
    pub active_segment_leader: u64,
    #[prost(message, repeated, tag = "5")]
    pub segments: ::prost::alloc::vec::Vec<SegmentMetadata>,
    #[prost(uint32, tag = "6")]
    pub replica_num: u32,
    #[prost(enumeration = "ShardStatusType", tag = "7")]
    pub status: i32,
    #[prost(message, optional, tag = "8")]
    pub error: ::core::option::Option<JournalEngineError>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SegmentMetadata {
    #[prost(uint32, tag = "1")]
    pub segment_no: u32,
    #[prost(uint64, tag = "2")]
    pub leader: u64,
    #[prost(uint64, repeated, tag = "3")]
    pub replicas: ::prost::alloc::vec::Vec<u64>,
    #[prost(uint64, tag = "4")]
    pub start_offset: u64,
    #[prost(uint64, tag = "5")]
    pub end_offset: u64,
    #[prost(uint64, tag = "6")]
    pub start_timestamp: u64,
    #[prost(uint64, tag = "7")]
    pub end_timestamp: u64,
    #[prost(enumeration = "SegmentStatusType", tag = "8")]
    pub status: i32,
}

// ---------------------------------------------------------------- GetClusterMetadata

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterMetadataReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<GetClusterMetadataReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterMetadataReqBody {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterMetadataResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<GetClusterMetadataRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterMetadataRespBody {
    #[prost(message, repeated, tag = "1")]
    pub nodes: ::prost::alloc::vec::Vec<JournalNodeMeta>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JournalNodeMeta {
    #[prost(uint64, tag = "1")]
    pub node_id: u64,
    #[prost(string, tag = "2")]
    pub tcp_addr: ::prost::alloc::string::String,
}

// ---------------------------------------------------------------- FetchOffset

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<FetchOffsetReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetReqBody {
    #[prost(string, tag = "1")]
    pub group_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub shards: ::prost::alloc::vec::Vec<FetchOffsetShard>,
    #[prost(enumeration = "AutoOffsetStrategy", tag = "3")]
    pub auto_offset_strategy: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetShard {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub segment_no: u32,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<FetchOffsetRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetRespBody {
    #[prost(string, tag = "1")]
    pub group_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub shard_offsets: ::prost::alloc::vec::Vec<FetchOffsetShardMeta>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FetchOffsetShardMeta {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
    #[prost(message, optional, tag = "4")]
    pub error: ::core::option::Option<JournalEngineError>,
}

// ---------------------------------------------------------------- ListShard

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListShardReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<ListShardReqBody>,
}

/// An empty namespace lists every shard of the cluster
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListShardReqBody {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListShardResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<ListShardRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListShardRespBody {
    #[prost(message, repeated, tag = "1")]
    pub shards: ::prost::alloc::vec::Vec<GetShardMetadataRespShard>,
}

// ---------------------------------------------------------------- OffsetCommit

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitReq {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<ReqHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<OffsetCommitReqBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitReqBody {
    #[prost(string, tag = "1")]
    pub group: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub shard: ::prost::alloc::vec::Vec<OffsetCommitShard>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitShard {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitResp {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<RespHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: ::core::option::Option<OffsetCommitRespBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitRespBody {
    #[prost(message, repeated, tag = "1")]
    pub resp: ::prost::alloc::vec::Vec<OffsetCommitShardResp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OffsetCommitShardResp {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub error: ::core::option::Option<JournalEngineError>,
}

// ---------------------------------------------------------------- Enums

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ApiKey {
    Unimplemented = 0,
    Read = 1,
    Write = 2,
    CreateShard = 3,
    DeleteShard = 4,
    GetShardMetadata = 5,
    GetClusterMetadata = 6,
    FetchOffset = 7,
    ListShard = 8,
    OffsetCommit = 9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ApiVersion {
    V0 = 0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReadType {
    Offset = 0,
    Key = 1,
    Tag = 2,
    Timestamp = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AutoOffsetStrategy {
    Earliest = 0,
    Latest = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ShardStatusType {
    Run = 0,
    PrepareDelete = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SegmentStatusType {
    Write = 0,
    SealUp = 1,
}
