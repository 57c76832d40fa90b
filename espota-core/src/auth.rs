//! Challenge-response authentication.
//!
//! The device proves nothing; the uploader proves it knows the shared
//! password. All digests are MD5 over the UTF-8 text, lower-case hex:
//!
//! ```text
//! cnonce = md5(image_path ++ content_size ++ image_md5 ++ device_address)
//! result = md5(md5(password) ++ ":" ++ nonce ++ ":" ++ cnonce)
//! ```
//!
//! Size and image digest are concatenated without a separator. Devices
//! compute the same string, so the format is fixed.

use md5::{Digest, Md5};

use crate::image::ImageDigest;
use crate::protocol::Command;

/// Lower-case hex MD5 of `data`.
#[must_use]
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Md5::digest(data.as_ref()))
}

/// Challenge issued by a device that requires a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    nonce: String,
}

impl AuthChallenge {
    #[must_use]
    pub fn new(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
        }
    }

    /// The server-issued nonce, exactly as the device sent it.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }
}

/// Derives the client nonce from the image metadata and device address.
///
/// `image_path` and `device_address` are used exactly as the caller gave
/// them; nothing is canonicalised or resolved.
#[must_use]
pub fn derive_cnonce(image_path: &str, digest: &ImageDigest, device_address: &str) -> String {
    md5_hex(format!(
        "{image_path}{size}{md5}{device_address}",
        size = digest.content_size(),
        md5 = digest.md5_hex(),
    ))
}

/// Derives the response digest for `nonce`. An empty password hashes the
/// empty string.
#[must_use]
pub fn derive_result(password: &str, nonce: &str, cnonce: &str) -> String {
    let pass_digest = md5_hex(password);
    md5_hex(format!("{pass_digest}:{nonce}:{cnonce}"))
}

/// Reply to an [`AuthChallenge`], sent over the datagram channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    cnonce: String,
    result: String,
}

impl AuthResponse {
    /// Computes the response for `challenge`.
    #[must_use]
    pub fn derive(
        challenge: &AuthChallenge,
        password: &str,
        image_path: &str,
        digest: &ImageDigest,
        device_address: &str,
    ) -> Self {
        let cnonce = derive_cnonce(image_path, digest, device_address);
        let result = derive_result(password, challenge.nonce(), &cnonce);
        Self { cnonce, result }
    }

    #[must_use]
    pub fn cnonce(&self) -> &str {
        &self.cnonce
    }

    #[must_use]
    pub fn result(&self) -> &str {
        &self.result
    }

    /// Wire form: `"200 <cnonce> <result>\n"`.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{code} {cnonce} {result}\n",
            code = u16::from(Command::Auth),
            cnonce = self.cnonce,
            result = self.result,
        )
    }
}
