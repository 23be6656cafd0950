use super::*;
use crate::raft::StateMachine;
use crate::JournalError;

fn journal_node(id: u64) -> BrokerNode {
    BrokerNode {
        node_id: id,
        address: format!("10.0.0.{}:1771", id),
        cluster_type: ClusterType::JournalServer,
        register_time: 100,
        last_heartbeat: 100,
    }
}

fn segment(
    segment_no: u32,
    start_offset: u64,
) -> SegmentInfo {
    SegmentInfo {
        namespace: "ns".to_string(),
        shard_name: "orders".to_string(),
        segment_no,
        leader: 1,
        replicas: vec![1, 2],
        start_offset,
        end_offset: start_offset,
        start_timestamp: 1000,
        end_timestamp: 0,
        status: SegmentStatus::Write,
    }
}

fn create_shard() -> MetadataCommand {
    create_named_shard("ns", "orders")
}

fn create_named_shard(
    namespace: &str,
    shard_name: &str,
) -> MetadataCommand {
    let mut first_segment = segment(0, 0);
    first_segment.namespace = namespace.to_string();
    first_segment.shard_name = shard_name.to_string();
    MetadataCommand::CreateShard {
        shard: ShardInfo {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
            replica_num: 2,
            replicas: vec![1, 2],
            active_segment: 0,
            next_segment_no: 1,
            status: ShardStatus::Run,
            create_time: 1000,
        },
        first_segment,
    }
}

fn roll(
    sealed_segment_no: u32,
    end_offset: u64,
) -> MetadataCommand {
    MetadataCommand::RollSegment {
        namespace: "ns".to_string(),
        shard_name: "orders".to_string(),
        sealed_segment_no,
        end_offset,
        end_timestamp: 2000,
        next: segment(sealed_segment_no + 1, end_offset),
    }
}

fn commands() -> Vec<MetadataCommand> {
    vec![
        MetadataCommand::RegisterNode(journal_node(1)),
        MetadataCommand::RegisterNode(journal_node(2)),
        MetadataCommand::NodeHeartbeat {
            cluster_type: ClusterType::JournalServer,
            node_id: 2,
            time: 500,
        },
        MetadataCommand::SetResourceConfig {
            path: vec!["cluster".to_string(), "retention".to_string()],
            config: b"7d".to_vec(),
        },
        MetadataCommand::CreateSchema {
            name: "order".to_string(),
            schema: b"{}".to_vec(),
        },
        MetadataCommand::BindSchema(SchemaBind {
            schema_name: "order".to_string(),
            resource: "ns/orders".to_string(),
        }),
        MetadataCommand::IdempotentSetIfAbsent {
            cluster_name: "c1".to_string(),
            producer_id: "p1".to_string(),
            seq_num: 1,
        },
        MetadataCommand::SaveOffset {
            cluster_name: "c1".to_string(),
            group: "g1".to_string(),
            namespace: "ns".to_string(),
            shard_name: "orders".to_string(),
            offset: 42,
        },
        create_shard(),
        roll(0, 10),
    ]
}

#[test]
fn test_apply_is_deterministic() {
    let mut a = PlacementStateMachine::new();
    let mut b = PlacementStateMachine::new();
    for (i, command) in commands().into_iter().enumerate() {
        let bytes = bincode::serialize(&command).unwrap();
        let ra = a.apply(i as u64 + 1, &bytes).unwrap();
        let rb = b.apply(i as u64 + 1, &bytes).unwrap();
        assert_eq!(ra, rb);
    }
    assert_eq!(a.state(), b.state());
    assert_eq!(a.snapshot().unwrap(), b.snapshot().unwrap());

    let mut restored = PlacementStateMachine::new();
    restored.restore(&a.snapshot().unwrap()).unwrap();
    assert_eq!(restored.state(), a.state());
}

/// # Case 1: first record is new
/// # Case 2: same triple again is a duplicate
/// # Case 3: after delete the triple is new again
#[test]
fn test_idempotent_set_if_absent() {
    let mut state = PlacementState::default();
    let set = || MetadataCommand::IdempotentSetIfAbsent {
        cluster_name: "c1".to_string(),
        producer_id: "p1".to_string(),
        seq_num: 7,
    };

    // Case 1
    assert_eq!(
        state.apply_command(set()),
        Ok(MetadataResponse::IdempotentSet { duplicate: false })
    );
    // Case 2
    assert_eq!(
        state.apply_command(set()),
        Ok(MetadataResponse::IdempotentSet { duplicate: true })
    );
    assert_eq!(
        state.query(MetadataQuery::IdempotentExists {
            cluster_name: "c1".to_string(),
            producer_id: "p1".to_string(),
            seq_num: 7,
        }),
        Ok(MetadataResponse::Exists(true))
    );
    // Case 3
    state
        .apply_command(MetadataCommand::IdempotentDelete {
            cluster_name: "c1".to_string(),
            producer_id: "p1".to_string(),
            seq_num: 7,
        })
        .unwrap();
    assert_eq!(
        state.apply_command(set()),
        Ok(MetadataResponse::IdempotentSet { duplicate: false })
    );
}

#[test]
fn test_shard_lifecycle() {
    let mut state = PlacementState::default();
    state.apply_command(create_shard()).unwrap();
    assert_eq!(
        state.apply_command(create_shard()),
        Err(JournalError::ShardAlreadyExists("ns/orders".to_string()))
    );

    state.apply_command(roll(0, 10)).unwrap();
    state.apply_command(roll(1, 25)).unwrap();
    // Stale roll of a segment that is no longer active
    assert!(matches!(
        state.apply_command(roll(1, 30)),
        Err(JournalError::SegmentSealed(_))
    ));

    let meta = match state.query(MetadataQuery::GetShard {
        namespace: "ns".to_string(),
        shard_name: "orders".to_string(),
    }) {
        Ok(MetadataResponse::Shard(meta)) => meta,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(meta.shard.active_segment, 2);
    assert_eq!(meta.shard.next_segment_no, 3);
    let chain: Vec<(u32, u64, u64, SegmentStatus)> = meta
        .segments
        .iter()
        .map(|s| (s.segment_no, s.start_offset, s.end_offset, s.status))
        .collect();
    assert_eq!(
        chain,
        vec![
            (0, 0, 10, SegmentStatus::SealUp),
            (1, 10, 25, SegmentStatus::SealUp),
            (2, 25, 25, SegmentStatus::Write),
        ]
    );
    assert_eq!(meta.active().map(|s| s.segment_no), Some(2));

    // Tombstone hides the shard and refuses a second delete
    let delete = || MetadataCommand::DeleteShard {
        namespace: "ns".to_string(),
        shard_name: "orders".to_string(),
    };
    assert!(matches!(state.apply_command(delete()), Ok(MetadataResponse::Shard(_))));
    assert_eq!(
        state.apply_command(delete()),
        Err(JournalError::ShardNotFound("ns/orders".to_string()))
    );
    assert_eq!(
        state.query(MetadataQuery::ListShards {
            namespace: String::new()
        }),
        Ok(MetadataResponse::Shards(vec![]))
    );
    // Name cannot be reused until the purge is committed
    assert!(state.apply_command(create_shard()).is_err());

    state
        .apply_command(MetadataCommand::PurgeShard {
            namespace: "ns".to_string(),
            shard_name: "orders".to_string(),
        })
        .unwrap();
    state.apply_command(create_shard()).unwrap();
}

#[test]
fn test_schema_and_resource_config() {
    let mut state = PlacementState::default();
    assert_eq!(
        state.apply_command(MetadataCommand::UpdateSchema {
            name: "s".to_string(),
            schema: vec![1],
        }),
        Err(JournalError::SchemaNotFound("s".to_string()))
    );
    state
        .apply_command(MetadataCommand::CreateSchema {
            name: "s".to_string(),
            schema: vec![1],
        })
        .unwrap();
    assert!(matches!(
        state.apply_command(MetadataCommand::CreateSchema {
            name: "s".to_string(),
            schema: vec![2],
        }),
        Err(JournalError::SchemaAlreadyExists(_))
    ));
    let bind = SchemaBind {
        schema_name: "s".to_string(),
        resource: "topic-a".to_string(),
    };
    state.apply_command(MetadataCommand::BindSchema(bind.clone())).unwrap();
    assert_eq!(
        state.query(MetadataQuery::ListSchemaBinds {
            schema_name: None,
            resource: Some("topic-a".to_string()),
        }),
        Ok(MetadataResponse::SchemaBinds(vec![bind]))
    );
    // Deleting the schema drops its binds
    state
        .apply_command(MetadataCommand::DeleteSchema { name: "s".to_string() })
        .unwrap();
    assert_eq!(
        state.query(MetadataQuery::ListSchemaBinds {
            schema_name: None,
            resource: None,
        }),
        Ok(MetadataResponse::SchemaBinds(vec![]))
    );

    let path = vec!["a".to_string(), "b".to_string()];
    assert_eq!(
        state.apply_command(MetadataCommand::DeleteResourceConfig { path: path.clone() }),
        Err(JournalError::ResourceNotFound("a/b".to_string()))
    );
    state
        .apply_command(MetadataCommand::SetResourceConfig {
            path: path.clone(),
            config: b"x".to_vec(),
        })
        .unwrap();
    assert_eq!(
        state.query(MetadataQuery::GetResourceConfig { path }),
        Ok(MetadataResponse::ResourceConfig(Some(b"x".to_vec())))
    );
}

#[test]
fn test_offsets_are_last_writer_wins_per_group() {
    let mut state = PlacementState::default();
    for (group, shard, offset) in [("g1", "a", 5), ("g1", "b", 7), ("g1", "a", 9), ("g2", "a", 1)] {
        state
            .apply_command(MetadataCommand::SaveOffset {
                cluster_name: "c1".to_string(),
                group: group.to_string(),
                namespace: "ns".to_string(),
                shard_name: shard.to_string(),
                offset,
            })
            .unwrap();
    }
    let offsets = match state.query(MetadataQuery::GetOffsets {
        cluster_name: "c1".to_string(),
        group: "g1".to_string(),
    }) {
        Ok(MetadataResponse::Offsets(offsets)) => offsets,
        other => panic!("unexpected {:?}", other),
    };
    let flat: Vec<(String, u64)> = offsets.into_iter().map(|o| (o.shard_name, o.offset)).collect();
    assert_eq!(flat, vec![("a".to_string(), 9), ("b".to_string(), 7)]);
}

#[test]
fn test_node_registry() {
    let mut state = PlacementState::default();
    assert_eq!(
        state.apply_command(MetadataCommand::NodeHeartbeat {
            cluster_type: ClusterType::JournalServer,
            node_id: 1,
            time: 10,
        }),
        Err(JournalError::NodeNotFound(1))
    );
    state.apply_command(MetadataCommand::RegisterNode(journal_node(1))).unwrap();
    state
        .apply_command(MetadataCommand::RegisterNode(BrokerNode {
            cluster_type: ClusterType::MqttBrokerServer,
            ..journal_node(5)
        }))
        .unwrap();
    match state.query(MetadataQuery::ListNodes {
        cluster_type: Some(ClusterType::JournalServer),
    }) {
        Ok(MetadataResponse::Nodes(nodes)) => assert_eq!(nodes, vec![journal_node(1)]),
        other => panic!("unexpected {:?}", other),
    }
    state
        .apply_command(MetadataCommand::UnregisterNode {
            cluster_type: ClusterType::JournalServer,
            node_id: 1,
        })
        .unwrap();
    assert_eq!(
        state.apply_command(MetadataCommand::UnregisterNode {
            cluster_type: ClusterType::JournalServer,
            node_id: 1,
        }),
        Err(JournalError::NodeNotFound(1))
    );
}

#[test]
fn test_rejected_command_is_encoded_in_band() {
    let mut machine = PlacementStateMachine::new();
    let bytes = bincode::serialize(&MetadataCommand::DeleteSchema { name: "x".to_string() }).unwrap();
    let out = machine.apply(1, &bytes).unwrap();
    assert!(matches!(
        decode_result(&out),
        Err(crate::Error::Journal(JournalError::SchemaNotFound(_)))
    ));
}

/// # Case 1: separators and dot names never reach the maps
/// # Case 2: shards whose names share a prefix keep their own segments
#[test]
fn test_shard_names_are_validated_and_kept_apart() {
    let mut state = PlacementState::default();

    // Case 1
    for (namespace, shard_name) in [("a/b", "c"), ("a", "b/c"), ("..", "orders"), ("ns", ""), ("ns", "a\0")] {
        assert!(matches!(
            state.apply_command(create_named_shard(namespace, shard_name)),
            Err(JournalError::InvalidShardName(_))
        ));
    }
    assert_eq!(
        state.query(MetadataQuery::ListShards {
            namespace: String::new()
        }),
        Ok(MetadataResponse::Shards(vec![]))
    );

    // Case 2
    state.apply_command(create_named_shard("ns", "a")).unwrap();
    state.apply_command(create_named_shard("ns", "ab")).unwrap();
    state.apply_command(create_named_shard("nsa", "b")).unwrap();
    for (namespace, shard_name) in [("ns", "a"), ("ns", "ab"), ("nsa", "b")] {
        let meta = match state.query(MetadataQuery::GetShard {
            namespace: namespace.to_string(),
            shard_name: shard_name.to_string(),
        }) {
            Ok(MetadataResponse::Shard(meta)) => meta,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(meta.segments.len(), 1);
        assert_eq!(meta.segments[0].shard_name, shard_name);
    }
}
