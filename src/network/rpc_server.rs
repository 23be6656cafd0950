use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::Framed;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::decode_message;
use super::encode_message;
use super::raft_frame_codec;
use super::RaftRpcHandler;
use crate::raft::RaftRequest;
use crate::raft::RaftResponse;
use crate::raft::RemoteError;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;

/// Accepts Raft peers and forwards their RPCs to `handler`.
pub struct RaftRpcServer {
    listener: TcpListener,
    config: NetworkConfig,
    handler: Arc<dyn RaftRpcHandler>,
}

impl RaftRpcServer {
    pub async fn bind(
        address: SocketAddr,
        config: NetworkConfig,
        handler: Arc<dyn RaftRpcHandler>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(NetworkError::Io)?;
        info!("raft rpc server listening on {}", address);
        Ok(Self {
            listener,
            config,
            handler,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(NetworkError::Io)?)
    }

    pub async fn serve(
        self,
        mut shutdown_signal: watch::Receiver<()>,
    ) -> Result<()> {
        let mut incoming = TcpListenerStream::new(self.listener);
        loop {
            tokio::select! {
                _ = shutdown_signal.changed() => {
                    info!("raft rpc server shutting down");
                    return Ok(());
                }
                accepted = incoming.next() => {
                    match accepted {
                        Some(Ok(stream)) => {
                            let peer = match stream.peer_addr() {
                                Ok(peer) => peer,
                                Err(e) => {
                                    debug!("raft peer left before being served: {:?}", e);
                                    continue;
                                }
                            };
                            debug!("accepted raft connection from {}", peer);
                            let _ = stream.set_nodelay(self.config.tcp_nodelay);
                            let handler = self.handler.clone();
                            let config = self.config.clone();
                            let shutdown = shutdown_signal.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, config, handler, shutdown).await {
                                    debug!("raft connection from {} closed: {}", peer, e);
                                }
                            });
                        }
                        Some(Err(e)) => {
                            error!("accept raft connection failed: {:?}", e);
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    config: NetworkConfig,
    handler: Arc<dyn RaftRpcHandler>,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let mut framed = Framed::new(stream, raft_frame_codec(&config));
    loop {
        let frame = tokio::select! {
            _ = shutdown_signal.changed() => return Ok(()),
            frame = framed.next() => frame,
        };
        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(NetworkError::Io(e).into()),
            None => return Ok(()),
        };

        let response = match decode_message::<RaftRequest>(&frame) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                warn!("undecodable raft request: {}", e);
                RaftResponse::Client(Err(RemoteError::Internal(e.to_string())))
            }
        };
        framed.send(encode_message(&response)?).await.map_err(NetworkError::Io)?;
    }
}
