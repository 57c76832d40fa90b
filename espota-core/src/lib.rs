//! # espota-core
//!
//! Shared building blocks for pushing OTA images to networked devices.
//!
//! This crate provides the runtime-free types used by [`espota-engine`] and
//! the `espota` binary.
//!
//! ## Responsibilities
//!
//! - **Protocol primitives**: command codes, the invitation and auth response
//!   datagrams, device reply parsing and the completion marker check.
//!
//! - **Authentication**: MD5 challenge-response derivation from the shared
//!   password, the device nonce and the image metadata.
//!
//! - **Image digest**: byte length and MD5 of the image, computed once before
//!   any network traffic.
//!
//! - **Request model**: the immutable [`request::TransferRequest`] a front end
//!   builds from its parameters.
//!
//! - **Errors**: the [`error::UploadError`] taxonomy, one variant per way a run
//!   can end early.
//!
//! - **Transport traits**: stream and datagram abstractions the engine drives,
//!   so tests can swap the sockets out.

pub mod auth;
pub mod error;
pub mod image;
pub mod protocol;
pub mod request;
pub mod transport;
