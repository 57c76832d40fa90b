use std::fmt;
use std::path::PathBuf;

/// Datagram stage of the handshake an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Invitation,
    Authentication,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invitation => f.write_str("invitation"),
            Self::Authentication => f.write_str("authentication"),
        }
    }
}

/// Every way an upload run ends early. All are terminal: nothing is
/// retried, and every socket and file of the run is closed by the time the
/// caller sees one.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The image could not be opened or read.
    #[error("cannot read image {}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transfer listener could not be bound.
    #[error("listen failed on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: anyhow::Error,
    },

    /// The datagram channel could not be opened or written to.
    #[error("datagram channel failed during {stage}")]
    Datagram {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The device did not reply in time.
    #[error("no answer from device to the {stage}")]
    NoAnswer { stage: Stage },

    /// The device replied to the invitation with something other than `OK`
    /// or a challenge.
    #[error("bad answer: {reply}")]
    BadAnswer { reply: String },

    /// The device refused the authentication response.
    #[error("authentication rejected: {reply}")]
    AuthRejected { reply: String },

    /// The device never connected back to the transfer listener.
    #[error("no response from device: {reason}")]
    DeviceNotResponding { reason: String },

    /// Sending a chunk or reading its acknowledgement failed.
    #[error("error uploading after {offset} bytes")]
    Transfer {
        offset: u64,
        #[source]
        source: anyhow::Error,
    },

    /// The device never sent the completion token.
    #[error("no result from device")]
    NoResult,
}

impl UploadError {
    /// Raw device text carried by the error, if any.
    #[must_use]
    pub fn device_reply(&self) -> Option<&str> {
        match self {
            Self::BadAnswer { reply } | Self::AuthRejected { reply } => Some(reply),
            _ => None,
        }
    }

    /// The message followed by every underlying cause, `": "`-separated.
    #[must_use]
    pub fn report(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            text.push_str(": ");
            text.push_str(&err.to_string());
            cause = err.source();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_displaying_stage_errors_expect_stage_named() {
        let invitation = UploadError::NoAnswer {
            stage: Stage::Invitation,
        };
        let auth = UploadError::NoAnswer {
            stage: Stage::Authentication,
        };
        assert_eq!(invitation.to_string(), "no answer from device to the invitation");
        assert_eq!(auth.to_string(), "no answer from device to the authentication");
    }

    #[test]
    fn when_device_text_errors_inspected_expect_raw_reply() {
        let err = UploadError::AuthRejected {
            reply: "FAIL bad password".into(),
        };
        assert_eq!(err.device_reply(), Some("FAIL bad password"));
        assert_eq!(err.to_string(), "authentication rejected: FAIL bad password");

        let err = UploadError::BadAnswer {
            reply: "BUSY".into(),
        };
        assert_eq!(err.device_reply(), Some("BUSY"));
        assert!(UploadError::NoResult.device_reply().is_none());
    }

    #[test]
    fn when_errors_wrap_causes_expect_source_reachable() {
        let err = UploadError::Transfer {
            offset: 2920,
            source: anyhow::anyhow!("connection reset"),
        };
        assert_eq!(err.to_string(), "error uploading after 2920 bytes");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "connection reset");

        let err = UploadError::LocalFile {
            path: PathBuf::from("/missing/fw.bin"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/missing/fw.bin"));
    }

    #[test]
    fn when_reporting_expect_every_cause_after_the_message() {
        let err = UploadError::Transfer {
            offset: 1460,
            source: anyhow::anyhow!("timed out after 10s").context("ack not received"),
        };
        assert_eq!(
            err.report(),
            "error uploading after 1460 bytes: ack not received: timed out after 10s"
        );
        assert_eq!(UploadError::NoResult.report(), "no result from device");
    }
}
