use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::error;
use tracing::info;

use super::AddLearnerRequest;
use super::ChangeMembershipRequest;
use super::Raft;
use super::RaftEvent;
use super::RaftParts;
use super::RaftRequest;
use super::RaftResponse;
use super::RaftStatus;
use super::StateMachine;
use crate::ConsensusError;
use crate::Error;
use crate::NetworkConfig;
use crate::RaftConfig;
use crate::RaftRpcHandler;
use crate::Result;
use crate::RAFT_PROPOSAL_LATENCY;

const EVENT_CHANNEL_SIZE: usize = 1024;

/// Cloneable handle to a running Raft core.
#[derive(Clone)]
pub struct RaftNode {
    node_id: u64,
    event_tx: mpsc::Sender<RaftEvent>,
    status_rx: watch::Receiver<RaftStatus>,
    proposal_timeout: Duration,
}

impl RaftNode {
    /// Spawns the Raft core on the current runtime.
    pub fn start<SM: StateMachine>(
        node_id: u64,
        raft_config: RaftConfig,
        network_config: &NetworkConfig,
        parts: RaftParts<SM>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<(Self, JoinHandle<Result<()>>)> {
        let proposal_timeout = Duration::from_millis(raft_config.proposal_timeout_ms);
        let rpc_timeout = Duration::from_millis(network_config.request_timeout_in_ms);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (status_tx, status_rx) = watch::channel(RaftStatus::initial(node_id));

        let mut raft = Raft::new(
            node_id,
            raft_config,
            rpc_timeout,
            parts,
            event_rx,
            status_tx,
            shutdown_signal,
        )?;
        let handle = tokio::spawn(async move {
            let result = raft.run().await;
            if let Err(e) = &result {
                error!("[Raft:{}] core stopped with error: {:?}", node_id, e);
            } else {
                info!("[Raft:{}] core stopped", node_id);
            }
            result
        });

        Ok((
            RaftNode {
                node_id,
                event_tx,
                status_rx,
                proposal_timeout,
            },
            handle,
        ))
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn status(&self) -> RaftStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_watcher(&self) -> watch::Receiver<RaftStatus> {
        self.status_rx.clone()
    }

    /// Proposes a state machine command and waits for it to be applied.
    pub async fn client_write(
        &self,
        command: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.call(|tx| RaftEvent::ClientWrite(command, tx)).await?
    }

    /// Leader-local query, served once the leader committed an entry of its term.
    pub async fn client_read(
        &self,
        query: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.call(|tx| RaftEvent::ClientRead(query, tx)).await?
    }

    pub async fn add_learner(
        &self,
        node_id: u64,
        address: String,
    ) -> Result<()> {
        self.call(|tx| RaftEvent::AddLearner(AddLearnerRequest { node_id, address }, tx))
            .await?
    }

    pub async fn change_membership(
        &self,
        request: ChangeMembershipRequest,
    ) -> Result<()> {
        self.call(|tx| RaftEvent::ChangeMembership(request, tx)).await?
    }

    /// Waits until some node is known as leader.
    pub async fn wait_for_leader(
        &self,
        wait: Duration,
    ) -> Result<u64> {
        let mut watcher = self.status_rx.clone();
        let fut = async {
            loop {
                if let Some(leader_id) = watcher.borrow_and_update().leader_id {
                    return Ok(leader_id);
                }
                if watcher.changed().await.is_err() {
                    return Err(Error::from(ConsensusError::Shutdown));
                }
            }
        };
        timeout(wait, fut)
            .await
            .map_err(|_| Error::from(ConsensusError::Timeout(wait)))?
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RaftEvent,
    ) -> Result<T> {
        let start = Instant::now();
        let (tx, rx) = oneshot::channel();
        self.event_tx
            .send(build(tx))
            .await
            .map_err(|_| Error::from(ConsensusError::Shutdown))?;

        let result = match timeout(self.proposal_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ConsensusError::Shutdown.into()),
            Err(_) => Err(ConsensusError::Timeout(self.proposal_timeout).into()),
        };
        RAFT_PROPOSAL_LATENCY.observe(start.elapsed().as_secs_f64());
        result
    }

    async fn send_peer_event<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RaftEvent,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.event_tx
            .send(build(tx))
            .await
            .map_err(|_| Error::from(ConsensusError::Shutdown))?;
        rx.await.map_err(|_| ConsensusError::Shutdown.into())
    }
}

#[async_trait::async_trait]
impl RaftRpcHandler for RaftNode {
    async fn handle(
        &self,
        request: RaftRequest,
    ) -> RaftResponse {
        let result = match request {
            RaftRequest::Vote(req) => {
                return match self.send_peer_event(|tx| RaftEvent::ReceiveVoteRequest(req, tx)).await {
                    Ok(response) => RaftResponse::Vote(response),
                    Err(e) => RaftResponse::Client(Err(e.into())),
                };
            }
            RaftRequest::AppendEntries(req) => {
                return match self.send_peer_event(|tx| RaftEvent::AppendEntries(req, tx)).await {
                    Ok(response) => RaftResponse::AppendEntries(response),
                    Err(e) => RaftResponse::Client(Err(e.into())),
                };
            }
            RaftRequest::InstallSnapshot(req) => {
                return match self.send_peer_event(|tx| RaftEvent::InstallSnapshot(req, tx)).await {
                    Ok(response) => RaftResponse::InstallSnapshot(response),
                    Err(e) => RaftResponse::Client(Err(e.into())),
                };
            }
            RaftRequest::ClientWrite(command) => self.client_write(command).await,
            RaftRequest::ClientRead(query) => self.client_read(query).await,
            RaftRequest::AddLearner(req) => self.add_learner(req.node_id, req.address).await.map(|_| Vec::new()),
            RaftRequest::ChangeMembership(req) => self.change_membership(req).await.map(|_| Vec::new()),
        };
        RaftResponse::Client(result.map_err(Into::into))
    }
}
