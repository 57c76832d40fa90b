use std::fmt;

use anyhow::{Result, bail};

use crate::auth::AuthChallenge;
use crate::image::ImageDigest;
use crate::transport::TransferListener;

/// Default UDP port devices listen on for invitations.
pub const DEFAULT_DEVICE_PORT: u16 = 8266;
/// Size of one image chunk on the transfer connection (one Ethernet frame
/// of TCP payload).
pub const CHUNK_SIZE: usize = 1460;
/// Largest reply accepted to the invitation datagram.
pub const INVITE_REPLY_MAX: usize = 128;
/// Largest reply accepted to the auth response datagram.
pub const AUTH_REPLY_MAX: usize = 32;
/// Largest per-chunk acknowledgement read after each chunk.
pub const CHUNK_ACK_MAX: usize = 4;
/// Largest fragment read while waiting for the completion token.
pub const RESULT_FRAGMENT_MAX: usize = 32;

const ACCEPT_REPLY: &str = "OK";
const AUTH_TOKEN: &str = "AUTH";
/// Devices send only digits or `OK` once the image is written; the first
/// `O` is the completion token.
const COMPLETION_MARKER: u8 = b'O';

/// Wire command codes. Devices match on these exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Flash = 0,
    Filesystem = 100,
    Auth = 200,
}

impl TryFrom<u16> for Command {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Flash),
            100 => Ok(Self::Filesystem),
            200 => Ok(Self::Auth),
            other => bail!("unknown command code: {other}"),
        }
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> u16 {
        command as u16
    }
}

/// Region of the device the image is written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    /// Application firmware.
    #[default]
    Flash,
    /// Filesystem image (SPIFFS on ESP devices).
    Filesystem,
}

impl Target {
    /// Command code announcing an upload to this region.
    #[must_use]
    pub fn command(self) -> Command {
        match self {
            Self::Flash => Command::Flash,
            Self::Filesystem => Command::Filesystem,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flash => f.write_str("firmware"),
            Self::Filesystem => f.write_str("filesystem"),
        }
    }
}

/// First datagram of a run, telling the device what is coming and which
/// port to connect back to.
///
/// Only constructible from a bound [`TransferListener`], so the advertised port is
/// always one that is already listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    command: Command,
    local_port: u16,
    content_size: u64,
    md5_hex: String,
}

impl Invitation {
    #[must_use]
    pub fn new<L: TransferListener>(target: Target, listener: &L, digest: &ImageDigest) -> Self {
        Self {
            command: target.command(),
            local_port: listener.local_port(),
            content_size: digest.content_size(),
            md5_hex: digest.md5_hex().to_owned(),
        }
    }

    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Wire form: `"<command> <local_port> <content_size> <md5_hex>\n"`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{command} {port} {size} {md5}\n",
            command = u16::from(self.command),
            port = self.local_port,
            size = self.content_size,
            md5 = self.md5_hex,
        )
    }
}

/// Device answer to an [`Invitation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteReply {
    /// The device takes the upload without a password.
    Accepted,
    /// The device wants proof of the shared password first.
    Challenge(AuthChallenge),
    /// Anything else, kept verbatim for the error report.
    Unexpected(String),
}

/// Classifies a reply to the invitation.
///
/// Acceptance is an exact `OK`. A challenge is any reply starting with
/// `AUTH` whose second whitespace-separated token is the nonce; a challenge
/// with no nonce is unexpected.
#[must_use]
pub fn parse_invite_reply(raw: &str) -> InviteReply {
    if raw == ACCEPT_REPLY {
        return InviteReply::Accepted;
    }
    if raw.starts_with(AUTH_TOKEN) {
        if let Some(nonce) = raw.split_whitespace().nth(1) {
            return InviteReply::Challenge(AuthChallenge::new(nonce));
        }
    }
    InviteReply::Unexpected(raw.to_owned())
}

/// Whether a reply to the auth response grants the upload.
#[must_use]
pub fn is_auth_accepted(raw: &str) -> bool {
    raw == ACCEPT_REPLY
}

/// Whether a fragment read after the last chunk carries the completion
/// token. Digit-only progress fragments do not.
#[must_use]
pub fn contains_completion_marker(fragment: &[u8]) -> bool {
    fragment.contains(&COMPLETION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DeviceStream;

    struct NullStream;

    impl DeviceStream for NullStream {
        fn peer(&self) -> String {
            "nowhere".into()
        }

        async fn send_chunk(&mut self, _chunk: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn recv_reply(&mut self, _buf: &mut [u8]) -> anyhow::Result<usize> {
            Ok(0)
        }

        async fn close(self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// A listener that is "bound" to a fixed port and never accepts.
    struct FixedPortListener(u16);

    impl TransferListener for FixedPortListener {
        type Stream = NullStream;

        fn local_port(&self) -> u16 {
            self.0
        }

        async fn accept(self) -> anyhow::Result<NullStream> {
            bail!("fixed port listener never accepts")
        }
    }

    #[test]
    fn when_converting_command_codes_expect_round_trip() {
        let codes = [
            (0, Command::Flash),
            (100, Command::Filesystem),
            (200, Command::Auth),
        ];
        for (code, expected) in codes {
            let parsed = Command::try_from(code).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(u16::from(parsed), code);
        }
    }

    #[test]
    fn when_parsing_unknown_command_code_expect_error() {
        let err = Command::try_from(1).unwrap_err();
        assert!(err.to_string().contains("unknown command code"));
    }

    #[test]
    fn when_mapping_targets_expect_wire_command_codes() {
        assert_eq!(Target::Flash.command(), Command::Flash);
        assert_eq!(Target::Filesystem.command(), Command::Filesystem);
        assert_eq!(Target::default(), Target::Flash);
    }

    #[test]
    fn when_building_invitation_expect_port_from_listener() {
        let content = b"firmware image bytes";
        let digest = ImageDigest::of(content);
        let invitation = Invitation::new(Target::Flash, &FixedPortListener(43210), &digest);

        assert_eq!(invitation.local_port(), 43210);
        assert_eq!(invitation.command(), Command::Flash);
        assert_eq!(
            invitation.encode(),
            format!("0 43210 {} {}\n", content.len(), digest.md5_hex())
        );
    }

    #[test]
    fn when_encoding_filesystem_invitation_expect_command_100() {
        let digest = ImageDigest::of(b"hello world");
        let invitation = Invitation::new(Target::Filesystem, &FixedPortListener(10000), &digest);
        assert_eq!(
            invitation.encode(),
            "100 10000 11 5eb63bbbe01eeed093cb22bb8f5acdc3\n"
        );
    }

    #[test]
    fn when_parsing_ok_reply_expect_accepted() {
        assert_eq!(parse_invite_reply("OK"), InviteReply::Accepted);
    }

    #[test]
    fn when_parsing_auth_reply_expect_second_token_as_nonce() {
        assert_eq!(
            parse_invite_reply("AUTH xyz123"),
            InviteReply::Challenge(AuthChallenge::new("xyz123"))
        );
        assert_eq!(
            parse_invite_reply("AUTH   abc\n"),
            InviteReply::Challenge(AuthChallenge::new("abc"))
        );
    }

    #[test]
    fn when_parsing_auth_reply_without_nonce_expect_unexpected() {
        assert_eq!(
            parse_invite_reply("AUTH"),
            InviteReply::Unexpected("AUTH".into())
        );
    }

    #[test]
    fn when_parsing_other_replies_expect_raw_text_kept() {
        for raw in ["ok", "OK\n", "ERR busy", ""] {
            assert_eq!(parse_invite_reply(raw), InviteReply::Unexpected(raw.into()));
        }
    }

    #[test]
    fn when_checking_auth_replies_expect_only_exact_ok() {
        assert!(is_auth_accepted("OK"));
        assert!(!is_auth_accepted("FAIL bad password"));
        assert!(!is_auth_accepted("OK "));
    }

    #[test]
    fn when_checking_result_fragments_expect_only_o_completes() {
        assert!(contains_completion_marker(b"OK"));
        assert!(contains_completion_marker(b"1460O"));
        assert!(!contains_completion_marker(b"1460"));
        assert!(!contains_completion_marker(b""));
        assert!(!contains_completion_marker(b"ok"));
    }
}
