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

use super::JournalHandler;
use super::JournalServerCodec;
use crate::NetworkConfig;
use crate::NetworkError;
use crate::Result;

/// Accepts journal engine clients. Requests of one connection are answered
/// in order.
pub struct JournalServer {
    listener: TcpListener,
    config: NetworkConfig,
    handler: Arc<JournalHandler>,
}

impl JournalServer {
    pub async fn bind(
        address: SocketAddr,
        config: NetworkConfig,
        handler: Arc<JournalHandler>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).await.map_err(NetworkError::Io)?;
        info!("journal server listening on {}", address);
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
                    info!("journal server shutting down");
                    return Ok(());
                }
                accepted = incoming.next() => {
                    match accepted {
                        Some(Ok(stream)) => {
                            let peer = match stream.peer_addr() {
                                Ok(peer) => peer,
                                Err(e) => {
                                    debug!("journal peer left before being served: {:?}", e);
                                    continue;
                                }
                            };
                            debug!("accepted journal connection from {}", peer);
                            let _ = stream.set_nodelay(self.config.tcp_nodelay);
                            let handler = self.handler.clone();
                            let codec = JournalServerCodec::new(self.config.max_journal_frame_size);
                            let shutdown = shutdown_signal.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, codec, handler, shutdown).await {
                                    debug!("journal connection from {} closed: {}", peer, e);
                                }
                            });
                        }
                        Some(Err(e)) => {
                            error!("accept journal connection failed: {:?}", e);
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
    codec: JournalServerCodec,
    handler: Arc<JournalHandler>,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let mut framed = Framed::new(stream, codec);
    loop {
        let packet = tokio::select! {
            _ = shutdown_signal.changed() => return Ok(()),
            packet = framed.next() => packet,
        };
        let packet = match packet {
            Some(packet) => packet?,
            None => return Ok(()),
        };
        let response = handler.handle(packet).await;
        framed.send(response).await?;
    }
}
