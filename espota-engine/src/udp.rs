use std::net::SocketAddr;

use anyhow::{Context, ensure};
use tokio::net;
use tracing::debug;

use espota_core::transport::{DatagramChannel, DatagramConnector};

/// A UDP socket on an ephemeral local port, aimed at one device.
pub struct UdpChannel {
    socket: net::UdpSocket,
    remote: SocketAddr,
}

impl DatagramChannel for UdpChannel {
    fn remote(&self) -> String {
        self.remote.to_string()
    }

    fn send<'a>(&'a self, buf: &'a [u8]) -> impl Future<Output = anyhow::Result<()>> + Send + 'a {
        async move {
            let sent = self
                .socket
                .send_to(buf, self.remote)
                .await
                .with_context(|| format!("failed to send datagram to {}", self.remote))?;
            ensure!(
                sent == buf.len(),
                "datagram truncated: sent {sent} of {} bytes",
                buf.len()
            );
            Ok(())
        }
    }

    fn recv<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move {
            let (len, from) = self
                .socket
                .recv_from(buf)
                .await
                .context("failed to receive datagram")?;
            debug!(from = %from, len, "Received datagram");
            Ok(len)
        }
    }
}

/// Opens [`UdpChannel`]s. The socket is left unconnected so the reply is
/// read whichever port the device answers from.
pub struct UdpConnector;

impl DatagramConnector for UdpConnector {
    type Channel = UdpChannel;

    fn open<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> impl Future<Output = anyhow::Result<Self::Channel>> + Send + 'a {
        async move {
            let remote = net::lookup_host((host, port))
                .await
                .with_context(|| format!("failed to resolve {host}:{port}"))?
                .next()
                .with_context(|| format!("no address found for {host}:{port}"))?;
            let local = if remote.is_ipv4() {
                "0.0.0.0:0"
            } else {
                "[::]:0"
            };
            let socket = net::UdpSocket::bind(local)
                .await
                .with_context(|| format!("failed to bind UDP socket on {local}"))?;
            debug!(remote = %remote, "Datagram channel opened");
            Ok(UdpChannel { socket, remote })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn when_opening_towards_unresolvable_host_expect_error() {
        let result = UdpConnector.open("no-such-host.invalid", 8266).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn when_datagram_sent_expect_device_receives_it_and_reply_comes_back() {
        let device = net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = device.local_addr().unwrap().port();

        let channel = UdpConnector.open("127.0.0.1", port).await.unwrap();
        assert_eq!(channel.remote(), format!("127.0.0.1:{port}"));

        channel.send(b"0 12345 10 abc\n").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"0 12345 10 abc\n");

        device.send_to(b"OK", from).await.unwrap();
        let mut reply = [0u8; 128];
        let n = channel.recv(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"OK");
    }

    #[tokio::test]
    async fn when_reply_is_longer_than_buffer_expect_truncated_read() {
        let device = net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = device.local_addr().unwrap().port();
        let channel = UdpConnector.open("127.0.0.1", port).await.unwrap();

        channel.send(b"hi").await.unwrap();
        let mut buf = [0u8; 8];
        let (_, from) = device.recv_from(&mut buf).await.unwrap();
        device.send_to(&[b'x'; 64], from).await.unwrap();

        let mut reply = [0u8; 32];
        let n = tokio::time::timeout(Duration::from_secs(5), channel.recv(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 32);
    }
}
