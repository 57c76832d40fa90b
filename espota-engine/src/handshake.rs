use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use espota_core::auth::{AuthChallenge, AuthResponse};
use espota_core::error::{Stage, UploadError};
use espota_core::image::ImageDigest;
use espota_core::protocol::{
    AUTH_REPLY_MAX, INVITE_REPLY_MAX, InviteReply, Invitation, is_auth_accepted,
    parse_invite_reply,
};
use espota_core::request::TransferRequest;
use espota_core::transport::DatagramChannel;

use crate::session::{EventSender, log_line};

/// Result of a successful invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    /// The device goes straight to the transfer.
    Accepted,
    /// The device wants an [`AuthResponse`] first.
    Challenge(AuthChallenge),
}

/// Sends `invitation` and classifies the device's reply.
///
/// # Errors
///
/// [`UploadError::Datagram`] if the datagram cannot be sent,
/// [`UploadError::NoAnswer`] if nothing arrives within `reply_timeout`,
/// [`UploadError::BadAnswer`] for a reply that is neither `OK` nor a
/// challenge.
pub async fn invite<C: DatagramChannel>(
    channel: &C,
    invitation: &Invitation,
    reply_timeout: Duration,
) -> Result<InviteOutcome, UploadError> {
    let reply = exchange(
        channel,
        Stage::Invitation,
        invitation.encode().as_bytes(),
        INVITE_REPLY_MAX,
        reply_timeout,
    )
    .await?;

    match parse_invite_reply(&reply) {
        InviteReply::Accepted => Ok(InviteOutcome::Accepted),
        InviteReply::Challenge(challenge) => {
            debug!(nonce = %challenge.nonce(), "Device requested authentication");
            Ok(InviteOutcome::Challenge(challenge))
        }
        InviteReply::Unexpected(reply) => Err(UploadError::BadAnswer { reply }),
    }
}

/// Sends `response` and checks the device accepts it.
///
/// # Errors
///
/// [`UploadError::Datagram`] if the datagram cannot be sent,
/// [`UploadError::NoAnswer`] if nothing arrives within `reply_timeout`,
/// [`UploadError::AuthRejected`] for any reply other than `OK`.
pub async fn authenticate<C: DatagramChannel>(
    channel: &C,
    response: &AuthResponse,
    reply_timeout: Duration,
) -> Result<(), UploadError> {
    let reply = exchange(
        channel,
        Stage::Authentication,
        response.encode().as_bytes(),
        AUTH_REPLY_MAX,
        reply_timeout,
    )
    .await?;

    if is_auth_accepted(&reply) {
        Ok(())
    } else {
        Err(UploadError::AuthRejected { reply })
    }
}

/// Runs the whole datagram handshake: invitation, then authentication if
/// the device asks for it.
///
/// Takes the channel by value; it is closed when this returns, whatever the
/// outcome.
///
/// # Errors
///
/// Any error of [`invite`] or [`authenticate`].
pub async fn negotiate<C: DatagramChannel>(
    channel: C,
    request: &TransferRequest,
    invitation: &Invitation,
    digest: &ImageDigest,
    reply_timeout: Duration,
    events: &EventSender,
) -> Result<(), UploadError> {
    info!(device = %channel.remote(), port = invitation.local_port(), "Sending invitation");
    log_line(
        events,
        format!("Sending invitation to {}", request.device_address()),
    );

    let challenge = match invite(&channel, invitation, reply_timeout).await? {
        InviteOutcome::Accepted => return Ok(()),
        InviteOutcome::Challenge(challenge) => challenge,
    };

    log_line(events, "Authenticating...");
    let response = AuthResponse::derive(
        &challenge,
        request.password(),
        &request.image_path_text(),
        digest,
        request.device_address(),
    );
    match authenticate(&channel, &response, reply_timeout).await {
        Ok(()) => {
            log_line(events, "Authenticating... OK");
            Ok(())
        }
        Err(e) => {
            log_line(events, "Authenticating... FAIL");
            Err(e)
        }
    }
}

/// Sends one datagram and waits for one reply of at most `max_len` bytes.
async fn exchange<C: DatagramChannel>(
    channel: &C,
    stage: Stage,
    payload: &[u8],
    max_len: usize,
    reply_timeout: Duration,
) -> Result<String, UploadError> {
    channel
        .send(payload)
        .await
        .map_err(|source| UploadError::Datagram { stage, source })?;

    let mut buf = vec![0u8; max_len];
    let len = match timeout(reply_timeout, channel.recv(&mut buf)).await {
        Ok(Ok(len)) => len,
        Ok(Err(e)) => {
            warn!(stage = %stage, error = %e, "Receive failed");
            return Err(UploadError::NoAnswer { stage });
        }
        Err(_) => {
            warn!(stage = %stage, timeout = ?reply_timeout, "No answer from device");
            return Err(UploadError::NoAnswer { stage });
        }
    };

    let reply = String::from_utf8_lossy(&buf[..len]).into_owned();
    debug!(stage = %stage, reply = %reply, "Device replied");
    Ok(reply)
}
