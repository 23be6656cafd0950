use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use super::JournalEnginePacket;
use crate::placement::unexpected_response;
use crate::placement::ClusterType;
use crate::placement::MetadataClient;
use crate::placement::MetadataQuery;
use crate::placement::MetadataResponse;
use crate::placement::SegmentStatus;
use crate::placement::ShardMeta;
use crate::placement::ShardStatus;
use crate::proto::journal_engine::*;
use crate::proto::journal_record::JournalRecord;
use crate::segment::ReadLimit;
use crate::segment::Segment;
use crate::BackoffPolicy;
use crate::Error;
use crate::JournalConfig;
use crate::JournalError;
use crate::OffsetTracker;
use crate::Result;
use crate::ShardManager;
use crate::REQUEST_ERRORS;
use crate::REQUEST_LATENCY;

/// Serves decoded journal engine requests.
///
/// Every request walks `Received -> Validated -> Routed -> Executed ->
/// Responded`. Failures are answered in-band: request level errors in
/// `RespHeader.error`, per item errors next to the item.
pub struct JournalHandler {
    shards: Arc<ShardManager>,
    tracker: Arc<OffsetTracker>,
    metadata: Arc<dyn MetadataClient>,
    read_defaults: ReadLimit,
    io_retry: BackoffPolicy,
    next_request_id: AtomicU64,
}

impl JournalHandler {
    pub fn new(
        shards: Arc<ShardManager>,
        tracker: Arc<OffsetTracker>,
        metadata: Arc<dyn MetadataClient>,
        journal: &JournalConfig,
        io_retry: BackoffPolicy,
    ) -> Self {
        Self {
            shards,
            tracker,
            metadata,
            read_defaults: ReadLimit::new(journal.default_read_max_size, journal.default_read_max_records),
            io_retry,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Answers one request packet. Never fails: a response packet is always
    /// returned.
    #[tracing::instrument(level = "debug", skip(self, packet), fields(api = packet.name()))]
    pub async fn handle(
        &self,
        packet: JournalEnginePacket,
    ) -> JournalEnginePacket {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let api = packet.name();
        debug!("request {} {}: Received", request_id, api);

        let header = match packet.req_header() {
            Some(header) => header.clone(),
            None => {
                warn!("request {}: response frame {} sent to the server", request_id, api);
                let err: Error = JournalError::UnimplementedApi {
                    api_key: ApiKey::Unimplemented as i32,
                    api_version: ApiVersion::V0 as i32,
                }
                .into();
                return JournalEnginePacket::ErrorResp(RespHeader::with_error(&ReqHeader::default(), &err));
            }
        };
        if let JournalEnginePacket::MalformedReq(_, reason) = &packet {
            warn!("request {}: undecodable frame, {}", request_id, reason);
            let err: Error = JournalError::MalformedRequest(reason.clone()).into();
            REQUEST_ERRORS.with_label_values(&[api, err.wire_code()]).inc();
            return JournalEnginePacket::ErrorResp(RespHeader::with_error(&header, &err));
        }
        if let Err(e) = validate(&header, &packet) {
            debug!("request {} {}: rejected, {}", request_id, api, e);
            REQUEST_ERRORS.with_label_values(&[api, e.wire_code()]).inc();
            return JournalEnginePacket::ErrorResp(RespHeader::with_error(&header, &e));
        }
        debug!("request {} {}: Validated", request_id, api);

        let timer = REQUEST_LATENCY.with_label_values(&[api]).start_timer();
        debug!("request {} {}: Routed", request_id, api);
        let response = match packet {
            JournalEnginePacket::WriteReq(req) => {
                let (header, body) = respond(api, &header, self.write(req.body).await);
                JournalEnginePacket::WriteResp(WriteResp { header, body })
            }
            JournalEnginePacket::ReadReq(req) => {
                let (header, body) = respond(api, &header, self.read(req.body).await);
                JournalEnginePacket::ReadResp(ReadResp { header, body })
            }
            JournalEnginePacket::CreateShardReq(req) => {
                let (header, body) = respond(api, &header, self.create_shard(req.body).await);
                JournalEnginePacket::CreateShardResp(CreateShardResp { header, body })
            }
            JournalEnginePacket::DeleteShardReq(req) => {
                let (header, body) = respond(api, &header, self.delete_shard(req.body).await);
                JournalEnginePacket::DeleteShardResp(DeleteShardResp { header, body })
            }
            JournalEnginePacket::GetShardMetadataReq(req) => {
                let (header, body) = respond(api, &header, self.get_shard_metadata(req.body).await);
                JournalEnginePacket::GetShardMetadataResp(GetShardMetadataResp { header, body })
            }
            JournalEnginePacket::GetClusterMetadataReq(_) => {
                let (header, body) = respond(api, &header, self.get_cluster_metadata().await);
                JournalEnginePacket::GetClusterMetadataResp(GetClusterMetadataResp { header, body })
            }
            JournalEnginePacket::FetchOffsetReq(req) => {
                let (header, body) = respond(api, &header, self.fetch_offset(req.body).await);
                JournalEnginePacket::FetchOffsetResp(FetchOffsetResp { header, body })
            }
            JournalEnginePacket::ListShardReq(req) => {
                let (header, body) = respond(api, &header, self.list_shard(req.body).await);
                JournalEnginePacket::ListShardResp(ListShardResp { header, body })
            }
            JournalEnginePacket::OffsetCommitReq(req) => {
                let (header, body) = respond(api, &header, self.offset_commit(req.body).await);
                JournalEnginePacket::OffsetCommitResp(OffsetCommitResp { header, body })
            }
            // Response variants and unsupported requests never pass validation
            _ => JournalEnginePacket::ErrorResp(RespHeader::with_error(&header, &unsupported(&header))),
        };
        timer.observe_duration();
        debug!("request {} {}: Executed", request_id, api);
        debug!("request {} {}: Responded with {}", request_id, api, response.name());
        response
    }

    // ---------------------------------------------------------------- Write

    async fn write(
        &self,
        body: Option<WriteReqBody>,
    ) -> Result<WriteRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("Write".to_string()))?;
        let mut status = Vec::with_capacity(body.data.len());
        for group in body.data {
            let messages = self.write_segment_group(&body.producer_id, &group).await;
            status.push(WriteRespMessage {
                namespace: group.namespace,
                shard_name: group.shard_name,
                segment: group.segment,
                messages,
            });
        }
        Ok(WriteRespBody { status })
    }

    async fn write_segment_group(
        &self,
        producer_id: &str,
        group: &WriteReqSegmentMessages,
    ) -> Vec<WriteRespMessageStatus> {
        let segment = match self
            .shards
            .segment(&group.namespace, &group.shard_name, group.segment)
            .await
        {
            Ok(segment) => segment,
            Err(e) => {
                let error = JournalEngineError::from(&e);
                return group
                    .messages
                    .iter()
                    .map(|m| WriteRespMessageStatus {
                        pkid: m.pkid,
                        offset: 0,
                        error: Some(error.clone()),
                        duplicate: false,
                    })
                    .collect();
            }
        };

        let mut statuses = Vec::with_capacity(group.messages.len());
        for message in &group.messages {
            let status = match self.write_record(producer_id, &segment, message).await {
                Ok(status) => status,
                Err(e) => WriteRespMessageStatus {
                    pkid: message.pkid,
                    offset: 0,
                    error: Some(JournalEngineError::from(&e)),
                    duplicate: false,
                },
            };
            statuses.push(status);
        }
        statuses
    }

    async fn write_record(
        &self,
        producer_id: &str,
        segment: &Segment,
        message: &WriteReqMessages,
    ) -> Result<WriteRespMessageStatus> {
        let recorded = if producer_id.is_empty() {
            false
        } else {
            if self.tracker.check_and_record(producer_id, message.pkid).await?.duplicate {
                return Ok(WriteRespMessageStatus {
                    pkid: message.pkid,
                    offset: 0,
                    error: None,
                    duplicate: true,
                });
            }
            true
        };

        let record = JournalRecord {
            producer_id: producer_id.to_string(),
            pkid: message.pkid,
            key: message.key.clone(),
            content: message.value.clone(),
            tags: message.tags.clone(),
            ..Default::default()
        };
        match self.append_with_retry(segment, record).await {
            Ok(offset) => Ok(WriteRespMessageStatus {
                pkid: message.pkid,
                offset,
                error: None,
                duplicate: false,
            }),
            Err(e) => {
                if recorded {
                    if let Err(del) = self.tracker.delete(producer_id, message.pkid).await {
                        warn!(
                            "idempotency key {}/{} kept after failed append: {}",
                            producer_id, message.pkid, del
                        );
                    }
                }
                // A sealed but still active segment is a roll whose commit failed
                if let Some(JournalError::SegmentFull(_) | JournalError::SegmentSealed(_)) = e.as_journal() {
                    let id = segment.identity();
                    if let Err(roll) = self
                        .shards
                        .roll_segment_if_active(&id.namespace, &id.shard_name, id.segment_no)
                        .await
                    {
                        warn!("rollover of segment {} failed: {}", id, roll);
                    }
                }
                Err(e)
            }
        }
    }

    /// Appends, retrying local io faults with exponential backoff.
    async fn append_with_retry(
        &self,
        segment: &Segment,
        record: JournalRecord,
    ) -> Result<u64> {
        let max_delay = Duration::from_millis(self.io_retry.max_delay_ms);
        let mut delay = Duration::from_millis(self.io_retry.base_delay_ms);
        let mut attempt = 0;
        loop {
            match segment.append(record.clone()) {
                Err(e) if e.is_io_failure() && attempt < self.io_retry.max_retries => {
                    attempt += 1;
                    warn!("append to {} failed (attempt {}): {}", segment.identity(), attempt, e);
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
                result => return result,
            }
        }
    }

    // ---------------------------------------------------------------- Read

    async fn read(
        &self,
        body: Option<ReadReqBody>,
    ) -> Result<ReadRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("Read".to_string()))?;
        let mut messages = Vec::with_capacity(body.messages.len());
        for message in body.messages {
            let (records, error) = match self.read_segment(&message).await {
                Ok(records) => (records, None),
                Err(e) => (Vec::new(), Some(JournalEngineError::from(&e))),
            };
            messages.push(ReadRespSegmentMessage {
                namespace: message.namespace,
                shard_name: message.shard_name,
                segment: message.segment,
                messages: records,
                error,
            });
        }
        Ok(ReadRespBody { messages })
    }

    async fn read_segment(
        &self,
        message: &ReadReqMessage,
    ) -> Result<Vec<ReadRespMessage>> {
        let read_type = ReadType::try_from(message.read_type)
            .map_err(|_| JournalError::InvalidFilter(format!("unknown read_type {}", message.read_type)))?;
        let filter = message.filter.clone().unwrap_or_default();
        let limit = self.read_limit(message.options.as_ref());
        let segment = self
            .shards
            .segment(&message.namespace, &message.shard_name, message.segment)
            .await?;

        let records = match read_type {
            ReadType::Offset => {
                let offset = filter.offset.ok_or_else(|| missing_filter(read_type, "offset"))?;
                segment.read_by_offset(offset, limit)?
            }
            ReadType::Key => {
                let key = filter.key.ok_or_else(|| missing_filter(read_type, "key"))?;
                segment.read_by_key(&key, filter.offset.unwrap_or(0), limit)?
            }
            ReadType::Tag => {
                let tag = filter.tag.ok_or_else(|| missing_filter(read_type, "tag"))?;
                segment.read_by_tag(&tag, filter.offset.unwrap_or(0), limit)?
            }
            ReadType::Timestamp => {
                let timestamp = filter.timestamp.ok_or_else(|| missing_filter(read_type, "timestamp"))?;
                segment.read_by_timestamp(timestamp, limit)?
            }
        };
        Ok(records
            .into_iter()
            .map(|r| ReadRespMessage {
                offset: r.offset,
                key: r.key,
                value: r.content,
                tags: r.tags,
                timestamp: r.create_time,
            })
            .collect())
    }

    /// Zero fields fall back to the configured defaults.
    fn read_limit(
        &self,
        options: Option<&ReadReqOptions>,
    ) -> ReadLimit {
        match options {
            Some(o) => ReadLimit::new(
                if o.max_size == 0 { self.read_defaults.max_size } else { o.max_size },
                if o.max_record == 0 { self.read_defaults.max_records } else { o.max_record },
            ),
            None => self.read_defaults,
        }
    }

    // ---------------------------------------------------------------- Shards

    async fn create_shard(
        &self,
        body: Option<CreateShardReqBody>,
    ) -> Result<CreateShardRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("CreateShard".to_string()))?;
        let meta = self
            .shards
            .create_shard(&body.namespace, &body.shard_name, body.replica_num)
            .await?;
        Ok(CreateShardRespBody {
            replica: meta.shard.replicas,
            segment_no: meta.shard.active_segment,
        })
    }

    async fn delete_shard(
        &self,
        body: Option<DeleteShardReqBody>,
    ) -> Result<DeleteShardRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("DeleteShard".to_string()))?;
        // Data removal runs in the background after the gc delay
        let _gc = self.shards.delete_shard(&body.namespace, &body.shard_name).await?;
        Ok(DeleteShardRespBody {})
    }

    async fn get_shard_metadata(
        &self,
        body: Option<GetShardMetadataReqBody>,
    ) -> Result<GetShardMetadataRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("GetShardMetadata".to_string()))?;
        let mut shards = Vec::with_capacity(body.shards.len());
        for shard in body.shards {
            let entry = match self.shards.get_shard_metadata(&shard.namespace, &shard.shard_name).await {
                Ok(meta) => shard_meta_to_proto(meta),
                Err(e) => GetShardMetadataRespShard {
                    namespace: shard.namespace,
                    shard_name: shard.shard_name,
                    error: Some(JournalEngineError::from(&e)),
                    ..Default::default()
                },
            };
            shards.push(entry);
        }
        Ok(GetShardMetadataRespBody { shards })
    }

    async fn list_shard(
        &self,
        body: Option<ListShardReqBody>,
    ) -> Result<ListShardRespBody> {
        let namespace = body.map(|b| b.namespace).unwrap_or_default();
        let shards = self.shards.list_shards(&namespace).await?;
        Ok(ListShardRespBody {
            shards: shards.into_iter().map(shard_meta_to_proto).collect(),
        })
    }

    async fn get_cluster_metadata(&self) -> Result<GetClusterMetadataRespBody> {
        let nodes = match self
            .metadata
            .read(MetadataQuery::ListNodes {
                cluster_type: Some(ClusterType::JournalServer),
            })
            .await?
        {
            MetadataResponse::Nodes(nodes) => nodes,
            other => return Err(unexpected_response("ListNodes", other)),
        };
        Ok(GetClusterMetadataRespBody {
            nodes: nodes
                .into_iter()
                .map(|n| JournalNodeMeta {
                    node_id: n.node_id,
                    tcp_addr: n.address,
                })
                .collect(),
        })
    }

    // ---------------------------------------------------------------- Offsets

    async fn fetch_offset(
        &self,
        body: Option<FetchOffsetReqBody>,
    ) -> Result<FetchOffsetRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("FetchOffset".to_string()))?;
        let strategy = AutoOffsetStrategy::try_from(body.auto_offset_strategy).map_err(|_| {
            JournalError::InvalidFilter(format!("unknown auto_offset_strategy {}", body.auto_offset_strategy))
        })?;

        let mut shard_offsets = Vec::with_capacity(body.shards.len());
        for shard in body.shards {
            let (offset, error) = match self.fetch_shard_offset(&body.group_name, strategy, &shard).await {
                Ok(offset) => (offset, None),
                Err(e) => (0, Some(JournalEngineError::from(&e))),
            };
            shard_offsets.push(FetchOffsetShardMeta {
                namespace: shard.namespace,
                shard_name: shard.shard_name,
                offset,
                error,
            });
        }
        Ok(FetchOffsetRespBody {
            group_name: body.group_name,
            shard_offsets,
        })
    }

    async fn fetch_shard_offset(
        &self,
        group_name: &str,
        strategy: AutoOffsetStrategy,
        shard: &FetchOffsetShard,
    ) -> Result<u64> {
        if shard.timestamp > 0 {
            return self
                .shards
                .offset_for_timestamp(&shard.namespace, &shard.shard_name, shard.timestamp)
                .await;
        }
        if !group_name.is_empty() {
            if let Some(offset) = self
                .tracker
                .shard_offset(group_name, &shard.namespace, &shard.shard_name)
                .await?
            {
                return Ok(offset);
            }
        }
        let (earliest, latest) = self.shards.offset_bounds(&shard.namespace, &shard.shard_name).await?;
        Ok(match strategy {
            AutoOffsetStrategy::Earliest => earliest,
            AutoOffsetStrategy::Latest => latest,
        })
    }

    async fn offset_commit(
        &self,
        body: Option<OffsetCommitReqBody>,
    ) -> Result<OffsetCommitRespBody> {
        let body = body.ok_or_else(|| JournalError::RequestBodyEmpty("OffsetCommit".to_string()))?;
        if body.group.is_empty() {
            return Err(JournalError::RequestBodyEmpty("OffsetCommit.group".to_string()).into());
        }
        let mut resp = Vec::with_capacity(body.shard.len());
        for shard in body.shard {
            let error = self
                .tracker
                .save_offset(&body.group, &shard.namespace, &shard.shard_name, shard.offset)
                .await
                .err()
                .map(|e| JournalEngineError::from(&e));
            resp.push(OffsetCommitShardResp {
                namespace: shard.namespace,
                shard_name: shard.shard_name,
                error,
            });
        }
        Ok(OffsetCommitRespBody { resp })
    }
}

fn validate(
    header: &ReqHeader,
    packet: &JournalEnginePacket,
) -> Result<()> {
    let served = match ApiKey::try_from(header.api_key) {
        Ok(api_key) => api_key.is_supported() && packet_api_key(packet) == Some(api_key),
        Err(_) => false,
    };
    if served && ApiVersion::try_from(header.api_version).is_ok() {
        Ok(())
    } else {
        Err(unsupported(header))
    }
}

fn packet_api_key(packet: &JournalEnginePacket) -> Option<ApiKey> {
    match packet {
        JournalEnginePacket::ReadReq(_) => Some(ApiKey::Read),
        JournalEnginePacket::WriteReq(_) => Some(ApiKey::Write),
        JournalEnginePacket::CreateShardReq(_) => Some(ApiKey::CreateShard),
        JournalEnginePacket::DeleteShardReq(_) => Some(ApiKey::DeleteShard),
        JournalEnginePacket::GetShardMetadataReq(_) => Some(ApiKey::GetShardMetadata),
        JournalEnginePacket::GetClusterMetadataReq(_) => Some(ApiKey::GetClusterMetadata),
        JournalEnginePacket::FetchOffsetReq(_) => Some(ApiKey::FetchOffset),
        JournalEnginePacket::ListShardReq(_) => Some(ApiKey::ListShard),
        JournalEnginePacket::OffsetCommitReq(_) => Some(ApiKey::OffsetCommit),
        _ => None,
    }
}

fn unsupported(header: &ReqHeader) -> Error {
    JournalError::UnimplementedApi {
        api_key: header.api_key,
        api_version: header.api_version,
    }
    .into()
}

fn missing_filter(
    read_type: ReadType,
    field: &str,
) -> Error {
    JournalError::InvalidFilter(format!("{:?} read requires filter.{}", read_type, field)).into()
}

/// Splits a handler result into response header and body. Failed requests
/// carry a default body.
fn respond<B: Default>(
    api: &'static str,
    header: &ReqHeader,
    result: Result<B>,
) -> (Option<RespHeader>, Option<B>) {
    match result {
        Ok(body) => (Some(RespHeader::ok(header)), Some(body)),
        Err(e) => {
            debug!("{} failed: {}", api, e);
            REQUEST_ERRORS.with_label_values(&[api, e.wire_code()]).inc();
            (Some(RespHeader::with_error(header, &e)), Some(B::default()))
        }
    }
}

pub(crate) fn shard_meta_to_proto(meta: ShardMeta) -> GetShardMetadataRespShard {
    let active_segment_leader = meta.active().map(|s| s.leader).unwrap_or_default();
    let status = match meta.shard.status {
        ShardStatus::Run => ShardStatusType::Run,
        ShardStatus::PrepareDelete => ShardStatusType::PrepareDelete,
    };
    GetShardMetadataRespShard {
        namespace: meta.shard.namespace,
        shard_name: meta.shard.shard_name,
        active_segment: meta.shard.active_segment,
        active_segment_leader,
        segments: meta
            .segments
            .into_iter()
            .map(|s| SegmentMetadata {
                segment_no: s.segment_no,
                leader: s.leader,
                replicas: s.replicas,
                start_offset: s.start_offset,
                end_offset: s.end_offset,
                start_timestamp: s.start_timestamp,
                end_timestamp: s.end_timestamp,
                status: match s.status {
                    SegmentStatus::Write => SegmentStatusType::Write,
                    SegmentStatus::SealUp => SegmentStatusType::SealUp,
                } as i32,
            })
            .collect(),
        replica_num: meta.shard.replica_num,
        status: status as i32,
        error: None,
    }
}
