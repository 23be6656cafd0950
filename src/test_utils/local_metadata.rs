use parking_lot::Mutex;

use crate::placement::BrokerNode;
use crate::placement::ClusterType;
use crate::placement::MetadataClient;
use crate::placement::MetadataCommand;
use crate::placement::MetadataQuery;
use crate::placement::MetadataResponse;
use crate::placement::PlacementState;
use crate::Error;
use crate::Result;

/// Metadata client applying commands straight to an in-memory placement
/// state, as a single-node placement group would.
#[derive(Default)]
pub struct LocalMetadataClient {
    state: Mutex<PlacementState>,
}

impl LocalMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ids` as journal servers
    pub fn with_journal_nodes(ids: &[u64]) -> Self {
        let client = Self::new();
        {
            let mut state = client.state.lock();
            for id in ids {
                let _ = state.apply_command(MetadataCommand::RegisterNode(BrokerNode {
                    node_id: *id,
                    address: format!("127.0.0.1:{}", 9000 + id),
                    cluster_type: ClusterType::JournalServer,
                    register_time: 0,
                    last_heartbeat: 0,
                }));
            }
        }
        client
    }

    pub fn snapshot(&self) -> PlacementState {
        self.state.lock().clone()
    }
}

#[async_trait::async_trait]
impl MetadataClient for LocalMetadataClient {
    async fn write(
        &self,
        command: MetadataCommand,
    ) -> Result<MetadataResponse> {
        self.state.lock().apply_command(command).map_err(Error::from)
    }

    async fn read(
        &self,
        query: MetadataQuery,
    ) -> Result<MetadataResponse> {
        self.state.lock().query(query).map_err(Error::from)
    }
}
