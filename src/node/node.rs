//! A running journal engine node: the placement Raft member plus the journal
//! engine components serving the journal protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::placement::MetadataClient;
use crate::raft::RaftNode;
use crate::segment::SegmentStore;
use crate::JournalHandler;
use crate::JournalNodeConfig;
use crate::OffsetTracker;
use crate::Result;
use crate::ShardManager;

pub struct JournalNode {
    pub(super) settings: Arc<JournalNodeConfig>,
    pub(super) raft: RaftNode,
    pub(super) raft_handle: Mutex<Option<JoinHandle<Result<()>>>>,
    pub(super) metadata: Arc<dyn MetadataClient>,
    pub(super) store: Arc<SegmentStore>,
    pub(super) shards: Arc<ShardManager>,
    pub(super) tracker: Arc<OffsetTracker>,
    pub(super) handler: Arc<JournalHandler>,
    /// Bound journal listener, `None` until the servers are started
    pub(super) journal_address: Option<SocketAddr>,
}

impl JournalNode {
    pub fn node_id(&self) -> u64 {
        self.raft.node_id()
    }

    pub fn settings(&self) -> &JournalNodeConfig {
        &self.settings
    }

    pub fn raft(&self) -> &RaftNode {
        &self.raft
    }

    pub fn metadata(&self) -> Arc<dyn MetadataClient> {
        self.metadata.clone()
    }

    pub fn shards(&self) -> &Arc<ShardManager> {
        &self.shards
    }

    pub fn tracker(&self) -> &Arc<OffsetTracker> {
        &self.tracker
    }

    pub fn handler(&self) -> &Arc<JournalHandler> {
        &self.handler
    }

    pub fn journal_address(&self) -> Option<SocketAddr> {
        self.journal_address
    }

    /// Waits until the Raft core stops, then flushes local segment state.
    ///
    /// Only the first caller waits on the core; later calls return at once.
    pub async fn run(&self) -> Result<()> {
        let handle = self.raft_handle.lock().take();
        let result = match handle {
            Some(handle) => handle.await?,
            None => Ok(()),
        };
        if let Err(e) = self.store.flush() {
            error!("flush segment store failed: {:?}", e);
        }
        info!("node {} stopped", self.node_id());
        result
    }
}
