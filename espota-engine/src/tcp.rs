use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use espota_core::transport::{DeviceStream, ListenerFactory, TransferListener};

/// Device stream over TCP.
///
/// Nagle is off: every chunk is followed by a wait for the device's ack, so
/// holding back a partial segment would only stall the exchange.
pub struct TcpDeviceStream {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpDeviceStream {
    fn new(stream: TcpStream, peer: SocketAddr) -> anyhow::Result<Self> {
        stream
            .set_nodelay(true)
            .with_context(|| format!("failed to disable Nagle towards {peer}"))?;
        Ok(Self { stream, peer })
    }
}

impl DeviceStream for TcpDeviceStream {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn send_chunk<'a>(
        &'a mut self,
        chunk: &'a [u8],
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a {
        async move {
            self.stream
                .write_all(chunk)
                .await
                .with_context(|| format!("failed to send {} bytes to {}", chunk.len(), self.peer))
        }
    }

    fn recv_reply<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move {
            self.stream
                .read(buf)
                .await
                .with_context(|| format!("failed to read reply from {}", self.peer))
        }
    }

    fn close(mut self) -> impl Future<Output = anyhow::Result<()>> + Send {
        async move {
            self.stream
                .shutdown()
                .await
                .with_context(|| format!("failed to close stream to {}", self.peer))
        }
    }
}

/// Listening socket for the device's connect-back.
pub struct TcpTransferListener {
    inner: TcpListener,
    port: u16,
}

impl TransferListener for TcpTransferListener {
    type Stream = TcpDeviceStream;

    fn local_port(&self) -> u16 {
        self.port
    }

    fn accept(self) -> impl Future<Output = anyhow::Result<Self::Stream>> + Send {
        async move {
            let Self { inner, port } = self;
            let (stream, peer) = inner
                .accept()
                .await
                .with_context(|| format!("failed to accept on port {port}"))?;
            // No second device may connect.
            drop(inner);
            debug!(peer = %peer, port, "Device connected back");
            TcpDeviceStream::new(stream, peer)
        }
    }
}

/// Binds [`TcpTransferListener`]s.
pub struct TcpListenerFactory;

impl ListenerFactory for TcpListenerFactory {
    type L = TcpTransferListener;

    fn bind<'a>(
        &'a self,
        addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::L>> + Send + 'a {
        async move {
            let inner = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
            let port = inner
                .local_addr()
                .context("failed to read bound address")?
                .port();
            info!(addr, port, "Transfer listener bound");
            Ok(TcpTransferListener { inner, port })
        }
    }
}
