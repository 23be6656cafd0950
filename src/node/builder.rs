//! A builder assembling a [`JournalNode`].
//!
//! ## Key Design Points
//! - **Default Components**: sled-backed Raft log and hard state, TCP transport.
//! - **Customization**: the transport can be overridden with
//!   [`NodeBuilder::transport`].
//! - **Lifecycle Management**:
//!   - `build()`: opens storage, spawns the Raft core and wires the journal engine.
//!   - `start_metrics_server()`/`start_rpc_server()`/`start_heartbeat()`: launch auxiliary
//!     services.
//!   - `ready()`: returns the assembled [`JournalNode`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(settings, shutdown_rx)
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .start_rpc_server()
//!     .await?
//!     .start_heartbeat()?
//!     .ready()?;
//! node.run().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;

use super::JournalNode;
use crate::init_sled_raft_db;
use crate::metrics;
use crate::placement::run_heartbeat_monitor;
use crate::placement::run_heartbeat_sender;
use crate::placement::ClusterType;
use crate::placement::HeartbeatMonitor;
use crate::placement::MetadataClient;
use crate::placement::PlacementStateMachine;
use crate::placement::RaftMetadataClient;
use crate::raft::Membership;
use crate::raft::RaftNode;
use crate::raft::RaftParts;
use crate::segment::SegmentConfig;
use crate::segment::SegmentStore;
use crate::JournalHandler;
use crate::JournalNodeConfig;
use crate::JournalServer;
use crate::OffsetTracker;
use crate::RaftRpcServer;
use crate::Result;
use crate::ShardManager;
use crate::SledRaftLog;
use crate::SledStateStorage;
use crate::SystemError;
use crate::TcpTransport;
use crate::Transport;

pub struct NodeBuilder {
    settings: Arc<JournalNodeConfig>,
    transport: Option<Arc<dyn Transport>>,
    shutdown_signal: watch::Receiver<()>,

    node: Option<JournalNode>,
}

impl NodeBuilder {
    pub fn new(
        settings: JournalNodeConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            transport: None,
            shutdown_signal,
            node: None,
        }
    }

    /// Replaces the TCP transport of the placement Raft node.
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Opens storage, spawns the Raft core and wires the journal engine.
    pub fn build(mut self) -> Result<Self> {
        let settings = self.settings.clone();
        let node_id = settings.cluster.node_id;
        debug!("build node {}", node_id);

        let raft_db = init_sled_raft_db(settings.cluster.raft_data_dir())?;
        let transport = self
            .transport
            .take()
            .unwrap_or_else(|| -> Arc<dyn Transport> { Arc::new(TcpTransport::new(settings.network.clone())) });
        let initial_membership = if settings.cluster.join_as_learner {
            Membership::default()
        } else {
            Membership::from_initial_cluster(&settings.cluster.initial_cluster)
        };
        let parts = RaftParts {
            raft_log: Arc::new(SledRaftLog::new(&raft_db)?),
            state_storage: Arc::new(SledStateStorage::new(&raft_db)?),
            transport: transport.clone(),
            state_machine: PlacementStateMachine::new(),
            initial_membership,
        };
        let (raft, raft_handle) = RaftNode::start(
            node_id,
            settings.raft.clone(),
            &settings.network,
            parts,
            self.shutdown_signal.clone(),
        )?;

        let metadata: Arc<dyn MetadataClient> = Arc::new(RaftMetadataClient::new(
            raft.clone(),
            transport,
            settings.retry.metadata_client,
            Duration::from_millis(settings.network.request_timeout_in_ms),
        ));
        let store = Arc::new(SegmentStore::open(
            &settings.cluster.journal_data_dir(),
            SegmentConfig::from(&settings.journal),
        )?);
        let shards = Arc::new(ShardManager::new(
            node_id,
            store.clone(),
            metadata.clone(),
            Duration::from_millis(settings.journal.shard_gc_delay_ms),
        ));
        let tracker = Arc::new(OffsetTracker::new(
            settings.cluster.cluster_name.clone(),
            metadata.clone(),
        ));
        let handler = Arc::new(JournalHandler::new(
            shards.clone(),
            tracker.clone(),
            metadata.clone(),
            &settings.journal,
            settings.retry.journal_io,
        ));

        self.node = Some(JournalNode {
            settings,
            raft,
            raft_handle: Mutex::new(Some(raft_handle)),
            metadata,
            store,
            shards,
            tracker,
            handler,
            journal_address: None,
        });
        Ok(self)
    }

    /// Launches the Prometheus endpoint on the configured port.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let port = self.settings.monitoring.prometheus_port;
        tokio::spawn(async move {
            metrics::start_server(port, shutdown_signal).await;
        });
        self
    }

    /// Binds and serves the Raft RPC listener and the journal listener.
    pub async fn start_rpc_server(mut self) -> Result<Self> {
        let node = self.node.as_mut().ok_or_else(not_built)?;

        let rpc_server = RaftRpcServer::bind(
            self.settings.cluster.raft_listen_address,
            self.settings.network.clone(),
            Arc::new(node.raft.clone()),
        )
        .await?;
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            if let Err(e) = rpc_server.serve(shutdown).await {
                error!("Raft RPC server stops. {:?}", e);
            }
        });

        let journal_server = JournalServer::bind(
            self.settings.cluster.journal_listen_address,
            self.settings.network.clone(),
            node.handler.clone(),
        )
        .await?;
        node.journal_address = Some(journal_server.local_addr()?);
        let shutdown = self.shutdown_signal.clone();
        tokio::spawn(async move {
            if let Err(e) = journal_server.serve(shutdown).await {
                error!("journal server stops. {:?}", e);
            }
        });
        Ok(self)
    }

    /// Registers this node as a journal server, keeps its heartbeat going
    /// and watches the heartbeats of all nodes while leading.
    pub fn start_heartbeat(self) -> Result<Self> {
        let node = self.node.as_ref().ok_or_else(not_built)?;
        let interval_ms = self.settings.raft.node_heartbeat_interval_ms;
        let address = node
            .journal_address
            .unwrap_or(self.settings.cluster.journal_listen_address)
            .to_string();

        tokio::spawn(run_heartbeat_sender(
            node.metadata.clone(),
            ClusterType::JournalServer,
            node.node_id(),
            address,
            interval_ms,
            self.shutdown_signal.clone(),
        ));
        tokio::spawn(run_heartbeat_monitor(
            node.raft.clone(),
            node.metadata.clone(),
            HeartbeatMonitor::new(interval_ms, self.settings.raft.heartbeat_miss_threshold),
            self.shutdown_signal.clone(),
        ));
        Ok(self)
    }

    /// Returns the built node.
    ///
    /// # Errors
    /// Returns [`SystemError::NodeStartFailed`] if `build()` did not run
    pub fn ready(self) -> Result<Arc<JournalNode>> {
        self.node.map(Arc::new).ok_or_else(not_built)
    }
}

fn not_built() -> crate::Error {
    SystemError::NodeStartFailed("node is not built".to_string()).into()
}
