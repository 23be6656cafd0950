use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use journal_engine::JournalEnginePacket;
use journal_engine::JournalNode;
use journal_engine::JournalNodeConfig;
use journal_engine::JournalServerCodec;
use journal_engine::NodeBuilder;
use journal_engine::NodeMeta;
use journal_engine::Result;
use tempfile::tempdir;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(10);
const MAX_FRAME: usize = 16 * 1024 * 1024;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn node_settings(
    node_id: u64,
    initial_cluster: &[NodeMeta],
    dir: &Path,
) -> JournalNodeConfig {
    let mut settings = JournalNodeConfig::default();
    settings.cluster.node_id = node_id;
    settings.cluster.db_root_dir = dir.join("db");
    settings.cluster.log_dir = dir.join("logs");
    settings.cluster.initial_cluster = initial_cluster.to_vec();
    settings.cluster.raft_listen_address = initial_cluster
        .iter()
        .find(|n| n.id == node_id)
        .unwrap()
        .address
        .parse()
        .unwrap();
    settings.cluster.journal_listen_address = "127.0.0.1:0".parse().unwrap();
    settings.raft.election.election_timeout_min = 300;
    settings.raft.election.election_timeout_max = 600;
    settings.raft.replication.rpc_append_entries_clock_in_ms = 50;
    settings.raft.node_heartbeat_interval_ms = 100;
    settings.monitoring.prometheus_enabled = false;
    settings
}

/// In-process journal nodes forming one placement group over real TCP.
pub struct TestCluster {
    _dir: TempDir,
    pub nodes: Vec<Arc<JournalNode>>,
    shutdown: Vec<watch::Sender<()>>,
}

impl TestCluster {
    pub async fn start(size: u64) -> TestCluster {
        let dir = tempdir().unwrap();
        let initial_cluster: Vec<NodeMeta> = (1..=size)
            .map(|id| NodeMeta {
                id,
                address: format!("127.0.0.1:{}", free_port()),
            })
            .collect();

        let mut nodes = Vec::new();
        let mut shutdown = Vec::new();
        for id in 1..=size {
            let (tx, rx) = watch::channel(());
            let settings = node_settings(id, &initial_cluster, &dir.path().join(id.to_string()));
            let node = NodeBuilder::new(settings, rx)
                .build()
                .unwrap()
                .start_rpc_server()
                .await
                .unwrap()
                .start_heartbeat()
                .unwrap()
                .ready()
                .unwrap();
            nodes.push(node);
            shutdown.push(tx);
        }
        TestCluster {
            _dir: dir,
            nodes,
            shutdown,
        }
    }

    pub fn node(
        &self,
        id: u64,
    ) -> &Arc<JournalNode> {
        &self.nodes[(id - 1) as usize]
    }

    pub fn journal_address(
        &self,
        id: u64,
    ) -> SocketAddr {
        self.node(id).journal_address().unwrap()
    }

    /// Stops one node and waits for its Raft core to exit.
    pub async fn stop(
        &self,
        id: u64,
    ) {
        let _ = self.shutdown[(id - 1) as usize].send(());
        self.node(id).run().await.unwrap();
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        for tx in &self.shutdown {
            let _ = tx.send(());
        }
    }
}

/// Minimal journal protocol client: one request in flight per connection.
pub struct JournalClient {
    framed: Framed<TcpStream, JournalServerCodec>,
}

impl JournalClient {
    pub async fn connect(address: SocketAddr) -> Result<JournalClient> {
        let stream = TcpStream::connect(address).await?;
        Ok(JournalClient {
            framed: Framed::new(stream, JournalServerCodec::new(MAX_FRAME)),
        })
    }

    pub async fn call(
        &mut self,
        request: JournalEnginePacket,
    ) -> JournalEnginePacket {
        self.framed.send(request).await.unwrap();
        self.framed.next().await.unwrap().unwrap()
    }
}
