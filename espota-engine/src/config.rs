use std::time::Duration;

/// Upper bounds on every wait of an upload run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait for the device's reply to the invitation and to the auth
    /// response.
    pub reply: Duration,
    /// Wait for the device to connect back to the transfer listener.
    pub accept: Duration,
    /// Per-chunk limit on sending the chunk and, separately, on reading its
    /// acknowledgement.
    pub chunk: Duration,
    /// Total wait for the completion token after the last chunk.
    pub result: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            reply: Duration::from_secs(10),
            accept: Duration::from_secs(10),
            chunk: Duration::from_secs(10),
            result: Duration::from_secs(60),
        }
    }
}

/// How the transfer stage reports progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProgressMode {
    /// A fractional `Progress` event per chunk, for a progress bar.
    Bar,
    /// A `Chunk` event per chunk, for a dot-per-chunk log.
    #[default]
    Dots,
}

/// Configuration of an [`UploadSession`](crate::session::UploadSession).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadConfig {
    pub timeouts: Timeouts,
    pub progress_mode: ProgressMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_config_defaulted_expect_protocol_waits() {
        let config = UploadConfig::default();
        assert_eq!(config.timeouts.reply, Duration::from_secs(10));
        assert_eq!(config.timeouts.accept, Duration::from_secs(10));
        assert_eq!(config.timeouts.chunk, Duration::from_secs(10));
        assert_eq!(config.timeouts.result, Duration::from_secs(60));
        assert_eq!(config.progress_mode, ProgressMode::Dots);
    }
}
