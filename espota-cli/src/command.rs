use std::path::PathBuf;

use clap::Parser;

use espota_core::protocol::{DEFAULT_DEVICE_PORT, Target};
use espota_core::request::{DEFAULT_BIND_ADDRESS, TransferRequest};
use espota_engine::config::{ProgressMode, UploadConfig};

/// espota: push a firmware or filesystem image to an ESP device over the
/// network.
///
/// Announces the image to the device over UDP, answers its password
/// challenge when it asks for one, then serves the image over a TCP
/// connection the device opens back to this host.
#[derive(Parser, Debug)]
#[command(name = "espota", version, about)]
pub struct Args {
    /// Device address.
    #[arg(short = 'i', long = "ip")]
    pub ip: String,

    /// Device OTA port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_DEVICE_PORT)]
    pub port: u16,

    /// Local address the transfer listener binds to.
    #[arg(short = 'I', long = "host-ip", default_value = DEFAULT_BIND_ADDRESS)]
    pub host_ip: String,

    /// Local port the transfer listener binds to (random when omitted).
    #[arg(short = 'P', long = "host-port")]
    pub host_port: Option<u16>,

    /// OTA password.
    #[arg(
        short = 'a',
        long = "auth",
        env = "ESPOTA_AUTH",
        default_value = "",
        hide_env_values = true
    )]
    pub auth: String,

    /// Image to upload.
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// Upload to the filesystem partition instead of the firmware slot.
    #[arg(short = 's', long)]
    pub spiffs: bool,

    /// Show a progress bar instead of one dot per chunk.
    #[arg(short = 'r', long)]
    pub progress: bool,

    /// Log protocol details.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Print every upload event as one JSON object per line.
    #[arg(long)]
    pub json: bool,
}

impl Args {
    pub fn target(&self) -> Target {
        if self.spiffs {
            Target::Filesystem
        } else {
            Target::Flash
        }
    }

    pub fn to_request(&self) -> TransferRequest {
        let request = TransferRequest::new(self.ip.clone(), self.file.clone())
            .with_device_port(self.port)
            .with_password(self.auth.clone())
            .with_target(self.target());
        let bind_port = self.host_port.unwrap_or_else(|| request.bind_port());
        request.with_bind(self.host_ip.clone(), bind_port)
    }

    pub fn to_config(&self) -> UploadConfig {
        UploadConfig {
            progress_mode: if self.progress {
                ProgressMode::Bar
            } else {
                ProgressMode::Dots
            },
            ..UploadConfig::default()
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "espota_cli=info,espota_engine=info,warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espota_core::request::LOCAL_PORT_RANGE;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("espota").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn when_only_device_and_file_given_expect_defaults() {
        let args = parse(&["-i", "192.168.1.20", "-f", "fw.bin"]);
        let request = args.to_request();

        assert_eq!(request.device_address(), "192.168.1.20");
        assert_eq!(request.device_port(), 8266);
        assert_eq!(request.bind_address(), "0.0.0.0");
        assert!(LOCAL_PORT_RANGE.contains(&request.bind_port()));
        assert_eq!(request.password(), "");
        assert_eq!(request.target(), Target::Flash);
        assert_eq!(args.to_config().progress_mode, ProgressMode::Dots);
        assert!(!args.json);
    }

    #[test]
    fn when_every_long_flag_given_expect_request_and_config_follow() {
        let args = parse(&[
            "--ip", "esp.local", "--port", "3232", "--host-ip", "10.0.0.5", "--host-port",
            "40000", "--auth", "s3cret", "--file", "/tmp/fs.bin", "--spiffs", "--progress",
            "--debug",
        ]);
        let request = args.to_request();

        assert_eq!(request.device_address(), "esp.local");
        assert_eq!(request.device_port(), 3232);
        assert_eq!(request.bind_address(), "10.0.0.5");
        assert_eq!(request.bind_port(), 40000);
        assert_eq!(request.password(), "s3cret");
        assert_eq!(request.image_path(), std::path::Path::new("/tmp/fs.bin"));
        assert_eq!(request.target(), Target::Filesystem);
        assert_eq!(args.to_config().progress_mode, ProgressMode::Bar);
        assert_eq!(args.log_filter(), "debug");
    }

    #[test]
    fn when_short_flags_given_expect_same_as_long_ones() {
        let args = parse(&[
            "-i", "10.1.1.1", "-p", "1234", "-I", "127.0.0.1", "-P", "23456", "-a", "pw", "-f",
            "x.bin", "-s", "-r", "-d",
        ]);

        assert_eq!(args.port, 1234);
        assert_eq!(args.host_ip, "127.0.0.1");
        assert_eq!(args.host_port, Some(23456));
        assert_eq!(args.auth, "pw");
        assert!(args.spiffs && args.progress && args.debug);
    }

    #[test]
    fn when_device_or_file_missing_expect_parse_error() {
        assert!(Args::try_parse_from(["espota", "-f", "fw.bin"]).is_err());
        assert!(Args::try_parse_from(["espota", "-i", "10.0.0.1"]).is_err());
    }

    #[test]
    fn when_port_out_of_range_expect_parse_error() {
        assert!(Args::try_parse_from(["espota", "-i", "a", "-f", "b", "-p", "70000"]).is_err());
    }
}
