use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::decode_message;
use super::encode_message;
use super::raft_frame_codec;
use super::Transport;
use crate::raft::RaftRequest;
use crate::raft::RaftResponse;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// One cached connection per peer address, one request in flight per
/// connection. A failed exchange drops the connection; the next call
/// reconnects.
pub struct TcpTransport {
    config: NetworkConfig,
    connections: DashMap<String, Arc<Mutex<Option<Connection>>>>,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl TcpTransport {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            connections: DashMap::new(),
        }
    }

    async fn connect(
        &self,
        address: &str,
    ) -> Result<Connection> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_in_ms);
        let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(NetworkError::ConnectError {
                    addr: address.to_string(),
                    source,
                }
                .into())
            }
            Err(_) => {
                return Err(NetworkError::ConnectError {
                    addr: address.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                }
                .into())
            }
        };
        stream.set_nodelay(self.config.tcp_nodelay).map_err(NetworkError::Io)?;
        debug!("connected to raft peer {}", address);
        Ok(Framed::new(stream, raft_frame_codec(&self.config)))
    }

    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        address: &str,
        request: &RaftRequest,
    ) -> Result<RaftResponse> {
        if slot.is_none() {
            *slot = Some(self.connect(address).await?);
        }
        let connection = match slot.as_mut() {
            Some(connection) => connection,
            None => return Err(NetworkError::ConnectionClosed(address.to_string()).into()),
        };

        connection.send(encode_message(request)?).await.map_err(NetworkError::Io)?;
        match connection.next().await {
            Some(Ok(frame)) => decode_message(&frame),
            Some(Err(e)) => Err(NetworkError::Io(e).into()),
            None => Err(NetworkError::ConnectionClosed(address.to_string()).into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(
        &self,
        target: u64,
        address: String,
        request: RaftRequest,
        timeout_duration: Duration,
    ) -> Result<RaftResponse> {
        trace!("send {} to node {} at {}", request.name(), target, address);
        let slot = self
            .connections
            .entry(address.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let result = timeout(timeout_duration, async {
            let mut guard = slot.lock().await;
            let result = self.exchange(&mut guard, &address, &request).await;
            if result.is_err() {
                *guard = None;
            }
            result
        })
        .await;

        match result {
            Ok(result) => result,
            Err(_) => {
                // The half-finished exchange may leave a stale answer behind
                if let Ok(mut guard) = slot.try_lock() {
                    *guard = None;
                }
                warn!("{} to node {} timed out after {:?}", request.name(), target, timeout_duration);
                Err(NetworkError::Timeout {
                    node_id: target,
                    duration: timeout_duration,
                }
                .into())
            }
        }
    }
}
