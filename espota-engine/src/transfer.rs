use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use espota_core::error::UploadError;
use espota_core::image::ImageDigest;
use espota_core::protocol::{
    CHUNK_ACK_MAX, CHUNK_SIZE, RESULT_FRAGMENT_MAX, contains_completion_marker,
};
use espota_core::transport::{DeviceStream, TransferListener};

use crate::config::{ProgressMode, UploadConfig};
use crate::session::{EventSender, UploadEvent, emit, log_line};

/// Serves the image to the device once it connects back.
///
/// The listener is spent by its single accept, also when the accept times
/// out. The device stream carries exactly one image followed by one result
/// read and is closed afterwards. File, stream and listener are released on
/// every return path.
///
/// # Errors
///
/// [`UploadError::DeviceNotResponding`] if the device does not connect in
/// time, [`UploadError::LocalFile`] if the image cannot be read,
/// [`UploadError::Transfer`] if a chunk or its acknowledgement fails,
/// [`UploadError::NoResult`] if the completion token never arrives.
pub async fn transfer<L: TransferListener>(
    listener: L,
    image_path: &Path,
    digest: &ImageDigest,
    config: &UploadConfig,
    events: &EventSender,
) -> Result<(), UploadError> {
    log_line(events, "Waiting for device...");
    let mut stream = match timeout(config.timeouts.accept, listener.accept()).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(UploadError::DeviceNotResponding {
                reason: format!("{e:#}"),
            });
        }
        Err(_) => {
            return Err(UploadError::DeviceNotResponding {
                reason: format!("no connection within {:?}", config.timeouts.accept),
            });
        }
    };
    info!(peer = %stream.peer(), "Device connected");

    let mut file = File::open(image_path)
        .await
        .map_err(|source| UploadError::LocalFile {
            path: image_path.to_path_buf(),
            source,
        })?;

    stream_image(&mut stream, &mut file, image_path, digest, config, events).await?;
    await_result(&mut stream, config.timeouts.result, events).await?;

    // The device reboots after OK and may already be gone.
    if let Err(e) = stream.close().await {
        debug!(error = %e, "Shutdown after result failed");
    }
    Ok(())
}

/// Sends the image chunk by chunk, reading a short acknowledgement after
/// each one. The acknowledgement content is not checked.
async fn stream_image<S: DeviceStream>(
    stream: &mut S,
    file: &mut File,
    image_path: &Path,
    digest: &ImageDigest,
    config: &UploadConfig,
    events: &EventSender,
) -> Result<(), UploadError> {
    let mode = config.progress_mode;
    let chunk_timeout = config.timeouts.chunk;
    match mode {
        ProgressMode::Bar => emit(events, UploadEvent::Progress(0.0)),
        ProgressMode::Dots => log_line(events, "Uploading"),
    }

    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut ack = [0u8; CHUNK_ACK_MAX];
    let mut offset: u64 = 0;

    loop {
        let len = read_chunk(file, &mut chunk)
            .await
            .map_err(|source| UploadError::LocalFile {
                path: image_path.to_path_buf(),
                source,
            })?;
        if len == 0 {
            break;
        }
        // `offset` only counts bytes the device has been sent.
        within(chunk_timeout, stream.send_chunk(&chunk[..len]))
            .await
            .map_err(|source| UploadError::Transfer { offset, source })?;
        offset += len as u64;
        match mode {
            ProgressMode::Bar => emit(events, UploadEvent::Progress(digest.progress(offset))),
            ProgressMode::Dots => emit(events, UploadEvent::Chunk),
        }

        let acked = within(chunk_timeout, stream.recv_reply(&mut ack))
            .await
            .map_err(|source| UploadError::Transfer { offset, source })?;
        if acked == 0 {
            return Err(UploadError::Transfer {
                offset,
                source: anyhow!("device closed the connection"),
            });
        }
        debug!(offset, ack = ?&ack[..acked], "Chunk acknowledged");
    }

    if offset == 0 && mode == ProgressMode::Bar {
        emit(events, UploadEvent::Progress(digest.progress(offset)));
    }
    info!(bytes = offset, "Image sent");
    Ok(())
}

/// Reads until the device sends a fragment containing the completion
/// token. Digit-only fragments (the device's progress counter) are skipped.
async fn await_result<S: DeviceStream>(
    stream: &mut S,
    result_timeout: Duration,
    events: &EventSender,
) -> Result<(), UploadError> {
    log_line(events, "Waiting for result...");
    let deadline = Instant::now() + result_timeout;
    let mut fragment = [0u8; RESULT_FRAGMENT_MAX];

    loop {
        let len = match timeout_at(deadline, stream.recv_reply(&mut fragment)).await {
            Ok(Ok(0)) => {
                warn!("Device closed the connection before the result");
                return Err(UploadError::NoResult);
            }
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read the result");
                return Err(UploadError::NoResult);
            }
            Err(_) => {
                warn!(timeout = ?result_timeout, "No result from device");
                return Err(UploadError::NoResult);
            }
        };

        if contains_completion_marker(&fragment[..len]) {
            log_line(events, "Result: OK");
            return Ok(());
        }
        debug!(fragment = %String::from_utf8_lossy(&fragment[..len]), "Interim result fragment");
    }
}

/// Fills `buf` from `file`, short only at end of file.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn within<T>(
    limit: Duration,
    op: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    timeout(limit, op)
        .await
        .map_err(|_| anyhow!("timed out after {limit:?}"))?
}
