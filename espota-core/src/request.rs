use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::protocol::{DEFAULT_DEVICE_PORT, Target};

/// Address the transfer listener binds to unless told otherwise.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
/// Range the default local port is drawn from.
pub const LOCAL_PORT_RANGE: RangeInclusive<u16> = 10000..=60000;

/// Picks a fresh local port for the transfer listener.
#[must_use]
pub fn random_local_port() -> u16 {
    rand::rng().random_range(LOCAL_PORT_RANGE)
}

/// Everything one upload run needs, fixed before the first socket opens.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferRequest {
    device_address: String,
    device_port: u16,
    bind_address: String,
    bind_port: u16,
    password: String,
    image_path: PathBuf,
    target: Target,
}

impl TransferRequest {
    /// A firmware upload to `device_address` with default ports, a random
    /// local port and no password.
    pub fn new(device_address: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            device_address: device_address.into(),
            device_port: DEFAULT_DEVICE_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            bind_port: random_local_port(),
            password: String::new(),
            image_path: image_path.into(),
            target: Target::Flash,
        }
    }

    #[must_use]
    pub fn with_device_port(mut self, port: u16) -> Self {
        self.device_port = port;
        self
    }

    #[must_use]
    pub fn with_bind(mut self, address: impl Into<String>, port: u16) -> Self {
        self.bind_address = address.into();
        self.bind_port = port;
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn device_address(&self) -> &str {
        &self.device_address
    }

    #[must_use]
    pub fn device_port(&self) -> u16 {
        self.device_port
    }

    #[must_use]
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    #[must_use]
    pub fn bind_port(&self) -> u16 {
        self.bind_port
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// The image path as text, exactly as given. Used in the auth cnonce.
    #[must_use]
    pub fn image_path_text(&self) -> Cow<'_, str> {
        self.image_path.to_string_lossy()
    }

    #[must_use]
    pub fn target(&self) -> Target {
        self.target
    }

    /// `address:port` string for binding the transfer listener. IPv6
    /// literals are bracketed.
    #[must_use]
    pub fn bind_endpoint(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.bind_port)
        } else {
            format!("{}:{}", self.bind_address, self.bind_port)
        }
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("device_address", &self.device_address)
            .field("device_port", &self.device_port)
            .field("bind_address", &self.bind_address)
            .field("bind_port", &self.bind_port)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("image_path", &self.image_path)
            .field("target", &self.target)
            .finish()
    }
}
