use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::raft::RaftRequest;
use crate::raft::RaftResponse;
use crate::NetworkError;
use crate::RaftRpcHandler;
use crate::Result;
use crate::Transport;

/// In-process network connecting Raft nodes of one test cluster.
#[derive(Default)]
pub struct MemRouter {
    handlers: RwLock<HashMap<u64, Arc<dyn RaftRpcHandler>>>,
    isolated: RwLock<HashSet<u64>>,
}

impl MemRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(
        &self,
        node_id: u64,
        handler: Arc<dyn RaftRpcHandler>,
    ) {
        self.handlers.write().insert(node_id, handler);
    }

    /// Drops every message to and from `node_id`
    pub fn isolate(
        &self,
        node_id: u64,
    ) {
        self.isolated.write().insert(node_id);
    }

    pub fn heal(
        &self,
        node_id: u64,
    ) {
        self.isolated.write().remove(&node_id);
    }

    pub fn transport(
        self: &Arc<Self>,
        from: u64,
    ) -> Arc<MemTransport> {
        Arc::new(MemTransport {
            from,
            router: self.clone(),
        })
    }
}

pub struct MemTransport {
    from: u64,
    router: Arc<MemRouter>,
}

#[async_trait::async_trait]
impl Transport for MemTransport {
    async fn send(
        &self,
        target: u64,
        address: String,
        request: RaftRequest,
        timeout: Duration,
    ) -> Result<RaftResponse> {
        let unreachable = {
            let isolated = self.router.isolated.read();
            isolated.contains(&self.from) || isolated.contains(&target)
        };
        let handler = self.router.handlers.read().get(&target).cloned();
        match handler {
            Some(handler) if !unreachable => tokio::time::timeout(timeout, handler.handle(request))
                .await
                .map_err(|_| {
                    NetworkError::Timeout {
                        node_id: target,
                        duration: timeout,
                    }
                    .into()
                }),
            _ => Err(NetworkError::ConnectError {
                addr: address,
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "node unreachable"),
            }
            .into()),
        }
    }
}
