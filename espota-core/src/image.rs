use crate::auth::md5_hex;

/// Length and MD5 of an image, announced to the device in the invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    content_size: u64,
    md5_hex: String,
}

impl ImageDigest {
    /// Digests the full image content.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self {
            content_size: content.len() as u64,
            md5_hex: md5_hex(content),
        }
    }

    /// Builds a digest from an already known length and hex MD5.
    #[must_use]
    pub fn from_parts(content_size: u64, md5_hex: impl Into<String>) -> Self {
        Self {
            content_size,
            md5_hex: md5_hex.into(),
        }
    }

    /// Image length in bytes.
    #[must_use]
    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    /// Lower-case hex MD5 of the image.
    #[must_use]
    pub fn md5_hex(&self) -> &str {
        &self.md5_hex
    }

    /// Fraction of the image covered by `offset`, clamped to `[0, 1]`.
    ///
    /// An empty image is complete from the start.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self, offset: u64) -> f64 {
        if self.content_size == 0 {
            return 1.0;
        }
        (offset as f64 / self.content_size as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_digesting_known_content_expect_size_and_md5() {
        let digest = ImageDigest::of(b"hello world");
        assert_eq!(digest.content_size(), 11);
        assert_eq!(digest.md5_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn when_digesting_multi_chunk_content_expect_byte_length() {
        let content = vec![0xA5u8; 1460 * 3 + 17];
        let digest = ImageDigest::of(&content);
        assert_eq!(digest.content_size(), 4397);
        assert_eq!(digest.md5_hex().len(), 32);
        assert!(digest.md5_hex().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn when_digesting_empty_content_expect_empty_string_md5() {
        let digest = ImageDigest::of(&[]);
        assert_eq!(digest.content_size(), 0);
        assert_eq!(digest.md5_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert!((digest.progress(0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn when_computing_progress_expect_clamped_fraction() {
        let digest = ImageDigest::of(&[0u8; 200]);
        assert!((digest.progress(0)).abs() < f64::EPSILON);
        assert!((digest.progress(50) - 0.25).abs() < f64::EPSILON);
        assert!((digest.progress(200) - 1.0).abs() < f64::EPSILON);
        assert!((digest.progress(400) - 1.0).abs() < f64::EPSILON);
    }
}
