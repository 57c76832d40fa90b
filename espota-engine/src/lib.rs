//! # espota-engine
//!
//! Tokio runtime for the espota upload protocol, embedded into the `espota`
//! binary.
//!
//! This crate provides:
//! - **Upload session**: one sequential run of bind, digest, handshake and
//!   transfer, generic over the transport traits of `espota-core`
//! - **Handshake**: invitation and optional challenge-response over UDP
//! - **Transfer**: chunked stream with per-chunk acknowledgement and the
//!   final result wait
//! - **Transport implementations**: TCP listener and UDP datagram channel
//! - **Event stream**: emits events (log lines, progress, done, halted)
//!   consumed by the CLI printer

pub mod config;
pub mod handshake;
pub mod session;
pub mod tcp;
pub mod transfer;
pub mod udp;

pub use config::{ProgressMode, Timeouts, UploadConfig};
pub use session::{EventSender, UploadEvent, UploadSession, upload};
