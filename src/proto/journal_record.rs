/// A record as persisted inside a segment file frame.
///
/// `offset` and `create_time` are assigned by the segment at commit time.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JournalRecord {
    #[prost(string, tag = "1")]
    pub producer_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub pkid: u64,
    #[prost(string, tag = "3")]
    pub key: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub content: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub create_time: u64,
    #[prost(string, repeated, tag = "6")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(uint64, tag = "7")]
    pub offset: u64,
    #[prost(string, tag = "8")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub shard_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "10")]
    pub segment: u32,
}
