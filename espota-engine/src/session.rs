use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use espota_core::error::{Stage, UploadError};
use espota_core::image::ImageDigest;
use espota_core::protocol::Invitation;
use espota_core::request::TransferRequest;
use espota_core::transport::{DatagramConnector, ListenerFactory, TransferListener};

use crate::config::UploadConfig;
use crate::handshake::negotiate;
use crate::tcp::TcpListenerFactory;
use crate::transfer::transfer;
use crate::udp::UdpConnector;

/// Events emitted during a run for the front end to render.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum UploadEvent {
    /// The run began.
    Started,
    /// A human-readable status line.
    Log(String),
    /// Fraction of the image sent, in `[0, 1]` (bar mode).
    Progress(f64),
    /// One more chunk sent (dots mode).
    Chunk,
    /// The run failed; carries the error and its causes.
    Halted(String),
    /// The device confirmed the image.
    Done,
}

/// Where a run reports its [`UploadEvent`]s.
pub type EventSender = mpsc::UnboundedSender<UploadEvent>;

/// Sends `event`, ignoring a front end that stopped listening.
pub(crate) fn emit(events: &EventSender, event: UploadEvent) {
    let _ = events.send(event);
}

pub(crate) fn log_line(events: &EventSender, line: impl Into<String>) {
    emit(events, UploadEvent::Log(line.into()));
}

/// One upload protocol run: bind, digest, handshake, transfer.
///
/// Generic over:
/// - `F: ListenerFactory`: binds the listener the device connects back to
/// - `D: DatagramConnector`: opens the handshake channel
///
/// Every socket and file a run opens is owned by that run and closed
/// before [`run`](UploadSession::run) returns. Concurrent runs need
/// distinct local ports.
pub struct UploadSession<F, D> {
    listeners: F,
    datagrams: D,
    config: UploadConfig,
}

impl UploadSession<TcpListenerFactory, UdpConnector> {
    /// A session over real TCP and UDP sockets.
    #[must_use]
    pub fn over_network(config: UploadConfig) -> Self {
        Self::new(TcpListenerFactory, UdpConnector, config)
    }
}

impl<F, D> UploadSession<F, D>
where
    F: ListenerFactory,
    D: DatagramConnector,
{
    pub fn new(listeners: F, datagrams: D, config: UploadConfig) -> Self {
        Self {
            listeners,
            datagrams,
            config,
        }
    }

    /// Pushes the image described by `request` to the device.
    ///
    /// Emits [`UploadEvent::Started`] first and [`UploadEvent::Done`] or
    /// [`UploadEvent::Halted`] last.
    ///
    /// # Errors
    ///
    /// Any [`UploadError`]; the run is not retried.
    pub async fn run(
        &self,
        request: &TransferRequest,
        events: &EventSender,
    ) -> Result<(), UploadError> {
        emit(events, UploadEvent::Started);
        let outcome = self.execute(request, events).await;
        match &outcome {
            Ok(()) => {
                info!(device = %request.device_address(), "Upload complete");
                emit(events, UploadEvent::Done);
            }
            Err(e) => {
                let report = e.report();
                error!(device = %request.device_address(), error = %report, "Upload failed");
                emit(events, UploadEvent::Halted(report));
            }
        }
        outcome
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        events: &EventSender,
    ) -> Result<(), UploadError> {
        // The listener comes first: its port goes into the invitation.
        let addr = request.bind_endpoint();
        log_line(events, format!("Starting on {addr}"));
        let listener = self
            .listeners
            .bind(&addr)
            .await
            .map_err(|source| UploadError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let digest = digest_image(request).await?;
        log_line(events, format!("Upload size: {}", digest.content_size()));
        debug!(
            size = digest.content_size(),
            md5 = %digest.md5_hex(),
            target = %request.target(),
            "Image digested"
        );

        let invitation = Invitation::new(request.target(), &listener, &digest);
        debug!(port = listener.local_port(), "Advertising transfer port");

        let channel = self
            .datagrams
            .open(request.device_address(), request.device_port())
            .await
            .map_err(|source| UploadError::Datagram {
                stage: Stage::Invitation,
                source,
            })?;
        negotiate(
            channel,
            request,
            &invitation,
            &digest,
            self.config.timeouts.reply,
            events,
        )
        .await?;

        transfer(listener, request.image_path(), &digest, &self.config, events).await
    }
}

/// Reads the whole image once and digests it.
async fn digest_image(request: &TransferRequest) -> Result<ImageDigest, UploadError> {
    let content = tokio::fs::read(request.image_path())
        .await
        .map_err(|source| UploadError::LocalFile {
            path: request.image_path().to_path_buf(),
            source,
        })?;
    Ok(ImageDigest::of(&content))
}

/// Runs one upload over the network with `config`.
///
/// # Errors
///
/// Any [`UploadError`] of [`UploadSession::run`].
pub async fn upload(
    request: &TransferRequest,
    config: UploadConfig,
    events: &EventSender,
) -> Result<(), UploadError> {
    UploadSession::over_network(config).run(request, events).await
}

// ── Tests ───────────────────────────────────────────────────────────
