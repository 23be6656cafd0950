use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use super::decode_result;
use super::MetadataCommand;
use super::MetadataQuery;
use super::MetadataResponse;
use crate::network::task_with_timeout_and_exponential_backoff;
use crate::raft::RaftNode;
use crate::raft::RaftRequest;
use crate::raft::RaftResponse;
use crate::BackoffPolicy;
use crate::ConsensusError;
use crate::Error;
use crate::NetworkError;
use crate::Result;
use crate::SystemError;
use crate::Transport;

/// Access to the replicated placement metadata.
///
/// Writes return once the command is committed and applied; reads are
/// served by the current leader.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait MetadataClient: Send + Sync + 'static {
    async fn write(
        &self,
        command: MetadataCommand,
    ) -> Result<MetadataResponse>;

    async fn read(
        &self,
        query: MetadataQuery,
    ) -> Result<MetadataResponse>;
}

/// [`MetadataClient`] over the local Raft node, following leader redirects
/// through the Raft transport.
pub struct RaftMetadataClient {
    node: RaftNode,
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    request_timeout: Duration,
}

/// The command was certainly not applied, so sending it again is safe.
pub(crate) fn is_safe_to_resend(e: &Error) -> bool {
    matches!(
        e,
        Error::Consensus(ConsensusError::NotLeader { .. })
            | Error::System(SystemError::Network(NetworkError::ConnectError { .. }))
    )
}

impl RaftMetadataClient {
    pub fn new(
        node: RaftNode,
        transport: Arc<dyn Transport>,
        policy: BackoffPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            node,
            transport,
            policy,
            request_timeout,
        }
    }

    async fn submit_once(
        &self,
        request: RaftRequest,
    ) -> Result<Vec<u8>> {
        let leader_id = self.node.wait_for_leader(self.request_timeout).await?;
        let local = match &request {
            RaftRequest::ClientWrite(payload) if leader_id == self.node.node_id() => {
                Some(self.node.client_write(payload.clone()).await)
            }
            RaftRequest::ClientRead(payload) if leader_id == self.node.node_id() => {
                Some(self.node.client_read(payload.clone()).await)
            }
            _ => None,
        };
        let leader_addr = match local {
            // Leadership moved while we were waiting
            Some(Err(Error::Consensus(ConsensusError::NotLeader {
                leader_id: Some(id),
                leader_addr: Some(addr),
            }))) if id != self.node.node_id() => (id, addr),
            Some(result) => return result,
            None => match self.node.status().leader_address() {
                Some(addr) => (leader_id, addr),
                None => {
                    return Err(ConsensusError::NotLeader {
                        leader_id: Some(leader_id),
                        leader_addr: None,
                    }
                    .into())
                }
            },
        };

        let (target, address) = leader_addr;
        debug!("forward {} to leader {} at {}", request.name(), target, address);
        let name = request.name();
        match self
            .transport
            .send(target, address, request, self.request_timeout)
            .await?
        {
            RaftResponse::Client(result) => result.map_err(Error::from),
            _ => Err(NetworkError::UnexpectedResponse { request_type: name }.into()),
        }
    }
}

#[async_trait::async_trait]
impl MetadataClient for RaftMetadataClient {
    async fn write(
        &self,
        command: MetadataCommand,
    ) -> Result<MetadataResponse> {
        let payload = bincode::serialize(&command)?;
        let max_attempts = self.policy.max_retries.max(1);
        let mut delay = Duration::from_millis(self.policy.base_delay_ms);
        let max_delay = Duration::from_millis(self.policy.max_delay_ms);

        let mut attempt = 1;
        loop {
            match self.submit_once(RaftRequest::ClientWrite(payload.clone())).await {
                Ok(bytes) => return decode_result(&bytes),
                Err(e) if attempt < max_attempts && is_safe_to_resend(&e) => {
                    warn!("{} attempt {} failed: {}; retrying in {:?}", command.name(), attempt, e, delay);
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read(
        &self,
        query: MetadataQuery,
    ) -> Result<MetadataResponse> {
        let payload = bincode::serialize(&query)?;
        let bytes = task_with_timeout_and_exponential_backoff(
            || self.submit_once(RaftRequest::ClientRead(payload.clone())),
            self.policy,
        )
        .await?;
        decode_result(&bytes)
    }
}
