use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tempfile::TempDir;

use super::*;
use crate::placement::MetadataClient;
use crate::placement::MetadataCommand;
use crate::placement::MetadataQuery;
use crate::placement::MetadataResponse;
use crate::proto::journal_engine::*;
use crate::segment::SegmentConfig;
use crate::segment::SegmentStore;
use crate::test_utils::LocalMetadataClient;
use crate::ConsensusError;
use crate::JournalConfig;
use crate::OffsetTracker;
use crate::Result;
use crate::RetryPolicies;
use crate::ShardManager;

struct Fixture {
    dir: TempDir,
    tracker: Arc<OffsetTracker>,
    handler: JournalHandler,
}

fn fixture(segment_config: SegmentConfig) -> Fixture {
    node_fixture(1, Arc::new(LocalMetadataClient::with_journal_nodes(&[1])), segment_config)
}

/// Handler of journal node `node_id`, with its own data dir
fn node_fixture(
    node_id: u64,
    metadata: Arc<dyn MetadataClient>,
    segment_config: SegmentConfig,
) -> Fixture {
    let dir = tempdir().unwrap();
    let store = Arc::new(SegmentStore::open(dir.path(), segment_config).unwrap());
    let shards = Arc::new(ShardManager::new(node_id, store, metadata.clone(), Duration::ZERO));
    let tracker = Arc::new(OffsetTracker::new("c1", metadata.clone()));
    let handler = JournalHandler::new(
        shards,
        tracker.clone(),
        metadata,
        &JournalConfig::default(),
        RetryPolicies::default().journal_io,
    );
    Fixture {
        dir,
        tracker,
        handler,
    }
}

async fn create_shard(
    handler: &JournalHandler,
    shard_name: &str,
) {
    let resp = handler
        .handle(JournalEnginePacket::CreateShardReq(CreateShardReq {
            header: Some(ReqHeader::v0(ApiKey::CreateShard)),
            body: Some(CreateShardReqBody {
                namespace: "ns".to_string(),
                shard_name: shard_name.to_string(),
                replica_num: 1,
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::CreateShardResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            let body = resp.body.unwrap();
            assert_eq!(body.replica, vec![1]);
            assert_eq!(body.segment_no, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn message(
    pkid: u64,
    key: &str,
    tags: &[&str],
) -> WriteReqMessages {
    WriteReqMessages {
        pkid,
        key: key.to_string(),
        value: format!("value-{}", pkid).into_bytes(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

async fn write(
    handler: &JournalHandler,
    producer_id: &str,
    shard_name: &str,
    segment: u32,
    messages: Vec<WriteReqMessages>,
) -> Vec<WriteRespMessageStatus> {
    let resp = handler
        .handle(JournalEnginePacket::WriteReq(WriteReq {
            header: Some(ReqHeader::v0(ApiKey::Write)),
            body: Some(WriteReqBody {
                producer_id: producer_id.to_string(),
                data: vec![WriteReqSegmentMessages {
                    namespace: "ns".to_string(),
                    shard_name: shard_name.to_string(),
                    segment,
                    messages,
                }],
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::WriteResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            resp.body.unwrap().status.remove(0).messages
        }
        other => panic!("unexpected {:?}", other),
    }
}

async fn read(
    handler: &JournalHandler,
    read_type: ReadType,
    filter: Option<ReadReqFilter>,
) -> ReadRespSegmentMessage {
    let resp = handler
        .handle(JournalEnginePacket::ReadReq(ReadReq {
            header: Some(ReqHeader::v0(ApiKey::Read)),
            body: Some(ReadReqBody {
                messages: vec![ReadReqMessage {
                    namespace: "ns".to_string(),
                    shard_name: "orders".to_string(),
                    segment: 0,
                    read_type: read_type as i32,
                    filter,
                    options: None,
                }],
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::ReadResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            resp.body.unwrap().messages.remove(0)
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn error_code(error: &Option<JournalEngineError>) -> &str {
    error.as_ref().map(|e| e.code.as_str()).unwrap_or("")
}

/// # Case 1: by offset
/// # Case 2: by key
/// # Case 3: by tag
/// # Case 4: by timestamp
/// # Case 5: filter field missing for the read type
#[tokio::test]
async fn test_write_then_read() {
    let f = fixture(SegmentConfig::default());
    create_shard(&f.handler, "orders").await;
    let statuses = write(
        &f.handler,
        "",
        "orders",
        0,
        vec![
            message(1, "a", &["red"]),
            message(2, "b", &["blue"]),
            message(3, "a", &["red", "blue"]),
        ],
    )
    .await;
    let offsets: Vec<u64> = statuses.iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert!(statuses.iter().all(|s| s.error.is_none() && !s.duplicate));

    // Case 1
    let resp = read(
        &f.handler,
        ReadType::Offset,
        Some(ReadReqFilter {
            offset: Some(1),
            ..Default::default()
        }),
    )
    .await;
    assert!(resp.error.is_none());
    assert_eq!(resp.messages.iter().map(|m| m.offset).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(resp.messages[0].value, b"value-2".to_vec());
    assert!(resp.messages[0].timestamp > 0);

    // Case 2
    let resp = read(
        &f.handler,
        ReadType::Key,
        Some(ReadReqFilter {
            key: Some("a".to_string()),
            ..Default::default()
        }),
    )
    .await;
    assert_eq!(resp.messages.iter().map(|m| m.offset).collect::<Vec<_>>(), vec![0, 2]);

    // Case 3
    let resp = read(
        &f.handler,
        ReadType::Tag,
        Some(ReadReqFilter {
            tag: Some("blue".to_string()),
            ..Default::default()
        }),
    )
    .await;
    assert_eq!(resp.messages.iter().map(|m| m.offset).collect::<Vec<_>>(), vec![1, 2]);

    // Case 4
    let resp = read(
        &f.handler,
        ReadType::Timestamp,
        Some(ReadReqFilter {
            timestamp: Some(1),
            ..Default::default()
        }),
    )
    .await;
    assert_eq!(resp.messages.len(), 3);

    // Case 5
    let resp = read(&f.handler, ReadType::Key, None).await;
    assert_eq!(error_code(&resp.error), "InvalidFilter");
    assert!(resp.messages.is_empty());
}

/// # Case 1: same producer and pkid is written once
/// # Case 2: without producer id nothing is deduplicated
#[tokio::test]
async fn test_idempotent_write() {
    let f = fixture(SegmentConfig::default());
    create_shard(&f.handler, "orders").await;

    // Case 1
    let first = write(&f.handler, "p1", "orders", 0, vec![message(9, "k", &[])]).await;
    assert!(!first[0].duplicate);
    assert_eq!(first[0].offset, 0);
    let second = write(&f.handler, "p1", "orders", 0, vec![message(9, "k", &[])]).await;
    assert!(second[0].duplicate);
    assert!(second[0].error.is_none());
    assert!(f.tracker.exists("p1", 9).await.unwrap());

    // Case 2
    let a = write(&f.handler, "", "orders", 0, vec![message(9, "k", &[])]).await;
    let b = write(&f.handler, "", "orders", 0, vec![message(9, "k", &[])]).await;
    assert_eq!((a[0].offset, b[0].offset), (1, 2));
}

#[tokio::test]
async fn test_full_segment_rolls_and_forgets_idempotency_key() {
    let f = fixture(SegmentConfig {
        max_records: 2,
        ..SegmentConfig::default()
    });
    create_shard(&f.handler, "orders").await;

    let statuses = write(
        &f.handler,
        "p1",
        "orders",
        0,
        vec![message(1, "k", &[]), message(2, "k", &[]), message(3, "k", &[])],
    )
    .await;
    assert!(statuses[0].error.is_none() && statuses[1].error.is_none());
    assert_eq!(error_code(&statuses[2].error), "SegmentFull");
    assert!(!f.tracker.exists("p1", 3).await.unwrap());

    // The rejected record is accepted by the new active segment
    let retried = write(&f.handler, "p1", "orders", 1, vec![message(3, "k", &[])]).await;
    assert!(retried[0].error.is_none());
    assert!(!retried[0].duplicate);
    assert_eq!(retried[0].offset, 2);

    // Writes to the sealed segment are refused
    let sealed = write(&f.handler, "", "orders", 0, vec![message(4, "k", &[])]).await;
    assert_eq!(error_code(&sealed[0].error), "SegmentSealed");
}

#[tokio::test]
async fn test_write_to_unknown_shard_fails_per_record() {
    let f = fixture(SegmentConfig::default());
    let statuses = write(&f.handler, "", "missing", 0, vec![message(1, "k", &[]), message(2, "k", &[])]).await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| error_code(&s.error) == "ShardNotFound"));
}

/// # Case 1: api key outside the served set
/// # Case 2: header api key disagrees with the body
/// # Case 3: unknown api version
/// # Case 4: body missing
#[tokio::test]
async fn test_request_validation() {
    let f = fixture(SegmentConfig::default());

    // Case 1
    let resp = f
        .handler
        .handle(JournalEnginePacket::UnsupportedReq(ReqHeader {
            api_key: 42,
            api_version: 0,
        }))
        .await;
    match resp {
        JournalEnginePacket::ErrorResp(header) => {
            assert_eq!(header.api_key, 42);
            assert_eq!(error_code(&header.error), "UnimplementedApi");
        }
        other => panic!("unexpected {:?}", other),
    }

    // Case 2
    let resp = f
        .handler
        .handle(JournalEnginePacket::WriteReq(WriteReq {
            header: Some(ReqHeader::v0(ApiKey::Read)),
            body: Some(WriteReqBody::default()),
        }))
        .await;
    assert!(matches!(resp, JournalEnginePacket::ErrorResp(h) if error_code(&h.error) == "UnimplementedApi"));

    // Case 3
    let resp = f
        .handler
        .handle(JournalEnginePacket::GetClusterMetadataReq(GetClusterMetadataReq {
            header: Some(ReqHeader {
                api_key: ApiKey::GetClusterMetadata as i32,
                api_version: 5,
            }),
            body: None,
        }))
        .await;
    assert!(matches!(resp, JournalEnginePacket::ErrorResp(h) if error_code(&h.error) == "UnimplementedApi"));

    // Case 4
    let resp = f
        .handler
        .handle(JournalEnginePacket::WriteReq(WriteReq {
            header: Some(ReqHeader::v0(ApiKey::Write)),
            body: None,
        }))
        .await;
    match resp {
        JournalEnginePacket::WriteResp(resp) => {
            assert_eq!(error_code(&resp.header.unwrap().error), "RequestBodyEmpty");
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// # Case 1: duplicate create is reported in the header
/// # Case 2: metadata of an existing and a missing shard
/// # Case 3: list then delete
#[tokio::test]
async fn test_shard_apis() {
    let f = fixture(SegmentConfig::default());
    create_shard(&f.handler, "orders").await;

    // Case 1
    let resp = f
        .handler
        .handle(JournalEnginePacket::CreateShardReq(CreateShardReq {
            header: Some(ReqHeader::v0(ApiKey::CreateShard)),
            body: Some(CreateShardReqBody {
                namespace: "ns".to_string(),
                shard_name: "orders".to_string(),
                replica_num: 1,
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::CreateShardResp(resp) => {
            assert_eq!(error_code(&resp.header.unwrap().error), "ShardAlreadyExists");
        }
        other => panic!("unexpected {:?}", other),
    }

    // Case 2
    write(&f.handler, "", "orders", 0, vec![message(1, "k", &[])]).await;
    let resp = f
        .handler
        .handle(JournalEnginePacket::GetShardMetadataReq(GetShardMetadataReq {
            header: Some(ReqHeader::v0(ApiKey::GetShardMetadata)),
            body: Some(GetShardMetadataReqBody {
                shards: vec![
                    GetShardMetadataReqShard {
                        namespace: "ns".to_string(),
                        shard_name: "orders".to_string(),
                    },
                    GetShardMetadataReqShard {
                        namespace: "ns".to_string(),
                        shard_name: "missing".to_string(),
                    },
                ],
            }),
        }))
        .await;
    let shards = match resp {
        JournalEnginePacket::GetShardMetadataResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            resp.body.unwrap().shards
        }
        other => panic!("unexpected {:?}", other),
    };
    assert!(shards[0].error.is_none());
    assert_eq!(shards[0].active_segment_leader, 1);
    assert_eq!(shards[0].segments[0].end_offset, 1);
    assert_eq!(shards[0].status, ShardStatusType::Run as i32);
    assert_eq!(shards[1].shard_name, "missing");
    assert_eq!(error_code(&shards[1].error), "ShardNotFound");

    // Case 3
    let list = |namespace: &str| {
        JournalEnginePacket::ListShardReq(ListShardReq {
            header: Some(ReqHeader::v0(ApiKey::ListShard)),
            body: Some(ListShardReqBody {
                namespace: namespace.to_string(),
            }),
        })
    };
    match f.handler.handle(list("ns")).await {
        JournalEnginePacket::ListShardResp(resp) => assert_eq!(resp.body.unwrap().shards.len(), 1),
        other => panic!("unexpected {:?}", other),
    }
    let resp = f
        .handler
        .handle(JournalEnginePacket::DeleteShardReq(DeleteShardReq {
            header: Some(ReqHeader::v0(ApiKey::DeleteShard)),
            body: Some(DeleteShardReqBody {
                namespace: "ns".to_string(),
                shard_name: "orders".to_string(),
            }),
        }))
        .await;
    assert!(matches!(resp, JournalEnginePacket::DeleteShardResp(r) if r.header.as_ref().unwrap().is_ok()));
    match f.handler.handle(list("")).await {
        JournalEnginePacket::ListShardResp(resp) => assert!(resp.body.unwrap().shards.is_empty()),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_cluster_metadata_lists_journal_nodes() {
    let f = fixture(SegmentConfig::default());
    let resp = f
        .handler
        .handle(JournalEnginePacket::GetClusterMetadataReq(GetClusterMetadataReq {
            header: Some(ReqHeader::v0(ApiKey::GetClusterMetadata)),
            body: Some(GetClusterMetadataReqBody {}),
        }))
        .await;
    match resp {
        JournalEnginePacket::GetClusterMetadataResp(resp) => {
            let nodes = resp.body.unwrap().nodes;
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].node_id, 1);
            assert_eq!(nodes[0].tcp_addr, "127.0.0.1:9001");
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// # Case 1: earliest and latest without a group offset
/// # Case 2: committed group offset wins over the strategy
/// # Case 3: timestamp lookup
/// # Case 4: unknown shard fails only its own entry
#[tokio::test]
async fn test_fetch_and_commit_offsets() {
    let f = fixture(SegmentConfig::default());
    create_shard(&f.handler, "orders").await;
    write(
        &f.handler,
        "",
        "orders",
        0,
        vec![message(1, "k", &[]), message(2, "k", &[]), message(3, "k", &[])],
    )
    .await;

    let fetch = |group: &str, strategy: AutoOffsetStrategy, timestamp: u64| {
        JournalEnginePacket::FetchOffsetReq(FetchOffsetReq {
            header: Some(ReqHeader::v0(ApiKey::FetchOffset)),
            body: Some(FetchOffsetReqBody {
                group_name: group.to_string(),
                auto_offset_strategy: strategy as i32,
                shards: vec![
                    FetchOffsetShard {
                        namespace: "ns".to_string(),
                        shard_name: "orders".to_string(),
                        segment_no: 0,
                        timestamp,
                    },
                    FetchOffsetShard {
                        namespace: "ns".to_string(),
                        shard_name: "missing".to_string(),
                        segment_no: 0,
                        timestamp,
                    },
                ],
            }),
        })
    };
    let offsets = |resp: JournalEnginePacket| match resp {
        JournalEnginePacket::FetchOffsetResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            resp.body.unwrap().shard_offsets
        }
        other => panic!("unexpected {:?}", other),
    };

    // Case 1
    let earliest = offsets(f.handler.handle(fetch("g1", AutoOffsetStrategy::Earliest, 0)).await);
    assert_eq!(earliest[0].offset, 0);
    let latest = offsets(f.handler.handle(fetch("g1", AutoOffsetStrategy::Latest, 0)).await);
    assert_eq!(latest[0].offset, 3);

    // Case 2
    let resp = f
        .handler
        .handle(JournalEnginePacket::OffsetCommitReq(OffsetCommitReq {
            header: Some(ReqHeader::v0(ApiKey::OffsetCommit)),
            body: Some(OffsetCommitReqBody {
                group: "g1".to_string(),
                shard: vec![OffsetCommitShard {
                    namespace: "ns".to_string(),
                    shard_name: "orders".to_string(),
                    offset: 2,
                }],
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::OffsetCommitResp(resp) => {
            let body = resp.body.unwrap();
            assert!(body.resp[0].error.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }
    let committed = offsets(f.handler.handle(fetch("g1", AutoOffsetStrategy::Latest, 0)).await);
    assert_eq!(committed[0].offset, 2);

    // Case 3
    let by_time = offsets(f.handler.handle(fetch("", AutoOffsetStrategy::Latest, 1)).await);
    assert_eq!(by_time[0].offset, 0);

    // Case 4
    assert_eq!(error_code(&by_time[1].error), "ShardNotFound");
    assert!(committed[1].error.is_some());
}

fn create_req(
    namespace: &str,
    shard_name: &str,
) -> JournalEnginePacket {
    JournalEnginePacket::CreateShardReq(CreateShardReq {
        header: Some(ReqHeader::v0(ApiKey::CreateShard)),
        body: Some(CreateShardReqBody {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            replica_num: 1,
        }),
    })
}

/// # Case 1: the other node refuses the write and names the leader
/// # Case 2: the leader assigns offsets from zero
/// # Case 3: the other node refuses reads instead of serving an empty segment
#[tokio::test]
async fn test_only_segment_leader_serves_records() {
    let metadata = Arc::new(LocalMetadataClient::with_journal_nodes(&[1, 2]));
    let node1 = node_fixture(1, metadata.clone(), SegmentConfig::default());
    let node2 = node_fixture(2, metadata.clone(), SegmentConfig::default());

    let leader_id = match node1.handler.handle(create_req("ns", "orders")).await {
        JournalEnginePacket::CreateShardResp(resp) => {
            assert!(resp.header.unwrap().is_ok());
            resp.body.unwrap().replica[0]
        }
        other => panic!("unexpected {:?}", other),
    };
    let (leader, other) = if leader_id == 1 { (&node1, &node2) } else { (&node2, &node1) };

    // Case 1
    let statuses = write(&other.handler, "", "orders", 0, vec![message(1, "k", &[])]).await;
    let error = statuses[0].error.as_ref().unwrap();
    assert_eq!(error.code, "NotLeader");
    assert!(error.error.contains(&format!("node {}", leader_id)));
    assert!(error.error.contains(&format!("127.0.0.1:{}", 9000 + leader_id)));
    assert!(!other.dir.path().join("ns").exists());

    // Case 2
    let statuses = write(&leader.handler, "", "orders", 0, vec![message(1, "k", &[]), message(2, "k", &[])]).await;
    let offsets: Vec<u64> = statuses.iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![0, 1]);
    assert!(statuses.iter().all(|s| s.error.is_none()));
    let statuses = write(&other.handler, "", "orders", 0, vec![message(3, "k", &[])]).await;
    assert_eq!(error_code(&statuses[0].error), "NotLeader");

    // Case 3
    let filter = Some(ReadReqFilter {
        offset: Some(0),
        ..Default::default()
    });
    let resp = read(&other.handler, ReadType::Offset, filter.clone()).await;
    assert_eq!(error_code(&resp.error), "NotLeader");
    assert!(resp.messages.is_empty());
    let resp = read(&leader.handler, ReadType::Offset, filter).await;
    assert_eq!(resp.messages.len(), 2);
}

/// # Case 1: names that would alias another shard's directory
/// # Case 2: names that would leave the data dir
/// # Case 3: nothing was registered
#[tokio::test]
async fn test_create_shard_rejects_unsafe_names() {
    let f = fixture(SegmentConfig::default());
    let handler = &f.handler;
    let create = |namespace: &'static str, shard_name: &'static str| async move {
        match handler.handle(create_req(namespace, shard_name)).await {
            JournalEnginePacket::CreateShardResp(resp) => error_code(&resp.header.unwrap().error).to_string(),
            other => panic!("unexpected {:?}", other),
        }
    };

    // Case 1
    assert_eq!(create("a/b", "c").await, "InvalidShardName");
    assert_eq!(create("a", "b/c").await, "InvalidShardName");
    assert_eq!(create("a", "b\\c").await, "InvalidShardName");

    // Case 2
    assert_eq!(create("..", "orders").await, "InvalidShardName");
    assert_eq!(create("ns", ".").await, "InvalidShardName");
    assert_eq!(create("", "orders").await, "InvalidShardName");
    assert_eq!(create("ns", "or\0ders").await, "InvalidShardName");
    assert!(!f.dir.path().join("..").join("orders").exists());

    // Case 3
    let resp = f
        .handler
        .handle(JournalEnginePacket::ListShardReq(ListShardReq {
            header: Some(ReqHeader::v0(ApiKey::ListShard)),
            body: Some(ListShardReqBody {
                namespace: String::new(),
            }),
        }))
        .await;
    match resp {
        JournalEnginePacket::ListShardResp(resp) => assert!(resp.body.unwrap().shards.is_empty()),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(create("a", "b").await, "");
}

/// Metadata client whose first segment roll fails to commit
struct FailingRollMetadata {
    inner: LocalMetadataClient,
    roll_failed: AtomicBool,
}

#[async_trait::async_trait]
impl MetadataClient for FailingRollMetadata {
    async fn write(
        &self,
        command: MetadataCommand,
    ) -> Result<MetadataResponse> {
        if matches!(command, MetadataCommand::RollSegment { .. }) && !self.roll_failed.swap(true, Ordering::SeqCst) {
            return Err(ConsensusError::Timeout(Duration::from_millis(10)).into());
        }
        self.inner.write(command).await
    }

    async fn read(
        &self,
        query: MetadataQuery,
    ) -> Result<MetadataResponse> {
        self.inner.read(query).await
    }
}

#[tokio::test]
async fn test_sealed_segment_rolls_after_failed_commit() {
    let metadata = Arc::new(FailingRollMetadata {
        inner: LocalMetadataClient::with_journal_nodes(&[1]),
        roll_failed: AtomicBool::new(false),
    });
    let f = node_fixture(
        1,
        metadata.clone(),
        SegmentConfig {
            max_records: 1,
            ..SegmentConfig::default()
        },
    );
    create_shard(&f.handler, "orders").await;
    let first = write(&f.handler, "p1", "orders", 0, vec![message(1, "k", &[])]).await;
    assert_eq!(first[0].offset, 0);

    // Segment 0 is full; it gets sealed but the roll is not committed
    let full = write(&f.handler, "p1", "orders", 0, vec![message(2, "k", &[])]).await;
    assert_eq!(error_code(&full[0].error), "SegmentFull");
    assert!(metadata.roll_failed.load(Ordering::SeqCst));

    // The sealed segment is still active, so the retry completes the roll
    let sealed = write(&f.handler, "p1", "orders", 0, vec![message(2, "k", &[])]).await;
    assert_eq!(error_code(&sealed[0].error), "SegmentSealed");

    let moved = write(&f.handler, "p1", "orders", 1, vec![message(2, "k", &[])]).await;
    assert!(moved[0].error.is_none());
    assert!(!moved[0].duplicate);
    assert_eq!(moved[0].offset, 1);
}

#[tokio::test]
async fn test_malformed_request_is_answered_in_band() {
    let f = fixture(SegmentConfig::default());
    let resp = f
        .handler
        .handle(JournalEnginePacket::MalformedReq(
            ReqHeader::v0(ApiKey::Write),
            "body: invalid varint".to_string(),
        ))
        .await;
    match resp {
        JournalEnginePacket::ErrorResp(header) => {
            assert_eq!(header.api_key, ApiKey::Write as i32);
            assert_eq!(error_code(&header.error), "MalformedRequest");
        }
        other => panic!("unexpected {:?}", other),
    }

    // The handler keeps serving afterwards
    create_shard(&f.handler, "orders").await;
}
