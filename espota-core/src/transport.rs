//! Transport seams of an upload run.
//!
//! Each handle is consumed by the step that finishes with it: the transfer
//! listener by its single [`accept`](TransferListener::accept), the device
//! stream by [`close`](DeviceStream::close), the datagram channel by the
//! handshake that owns it. A run can therefore never reuse a socket from an
//! earlier stage.

use std::future::Future;

/// The stream the device opens back to us once it accepted the invitation.
///
/// Carries exactly one image, chunk by chunk, then the device's result text.
pub trait DeviceStream: Send + 'static {
    /// Remote end, for logs (e.g. `"192.168.1.20:50123"`).
    fn peer(&self) -> String;

    /// Sends one image chunk in full.
    fn send_chunk<'a>(
        &'a mut self,
        chunk: &'a [u8],
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'a;

    /// Reads the next piece of device text (a chunk acknowledgement, a
    /// progress counter or the result) into `buf`.
    ///
    /// `Ok(0)` means the device closed the stream.
    fn recv_reply<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a;

    /// Ends the transfer after the result was read.
    fn close(self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Listener bound before the invitation goes out, so its port can be
/// advertised. Accepts one device and is gone.
pub trait TransferListener: Send + 'static {
    type Stream: DeviceStream;

    /// Port announced to the device in the invitation.
    fn local_port(&self) -> u16;

    /// Waits for the device and closes the listening socket.
    fn accept(self) -> impl Future<Output = anyhow::Result<Self::Stream>> + Send;
}

/// Binds [`TransferListener`]s. `TcpListenerFactory` in production, fakes in
/// tests.
pub trait ListenerFactory: Send + Sync + 'static {
    type L: TransferListener;

    /// Binds to `addr`; `"<ip>:0"` lets the OS pick the port.
    fn bind<'a>(
        &'a self,
        addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::L>> + Send + 'a;
}

/// A connectionless channel aimed at a single device.
///
/// Carries the invitation and authentication datagrams. Replies are read
/// from whoever answers on the local socket, matching how devices reply
/// from whatever port they like.
pub trait DatagramChannel: Send + Sync + 'static {
    /// Returns the resolved device address datagrams are sent to.
    fn remote(&self) -> String;

    /// Sends `buf` to the device as a single datagram.
    fn send<'a>(&'a self, buf: &'a [u8]) -> impl Future<Output = anyhow::Result<()>> + Send + 'a;

    /// Receives one datagram into `buf`, returning its length. Bytes past
    /// `buf.len()` are discarded.
    fn recv<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a;
}

/// Factory for opening [`DatagramChannel`]s towards a device.
pub trait DatagramConnector: Send + Sync + 'static {
    /// The concrete channel type produced by [`open`](DatagramConnector::open).
    type Channel: DatagramChannel;

    /// Resolves `host`/`port` and opens a channel aimed at it.
    fn open<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> impl Future<Output = anyhow::Result<Self::Channel>> + Send + 'a;
}
